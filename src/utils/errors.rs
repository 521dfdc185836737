//! Error types for the scheduler.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use crate::utils::location::Span;
use std::fmt;

/// Top-level error type for the scheduler.
#[derive(Error, Debug)]
pub enum PolySchedError {
    /// Malformed domains or dependences, rejected before scheduling
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Error while reading the textual form
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error reported by a solver backend
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    /// Scheduling could not produce a legal schedule
    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Integer arithmetic left the representable range
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolySchedError {
    /// Shorthand for an overflow error.
    pub fn overflow(what: impl Into<String>) -> Self {
        PolySchedError::Overflow(what.into())
    }
}

/// Malformed input data.
#[derive(Error, Debug, Clone)]
pub struct InputError {
    /// The error message
    pub message: String,
    /// The kind of input error
    pub kind: InputErrorKind,
}

impl InputError {
    /// Create a new input error.
    pub fn new(kind: InputErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorKind {
    /// No statements to schedule
    EmptyProgram,
    /// Two statements share an identifier
    DuplicateStatement,
    /// A dependence names a statement that does not exist
    UnknownStatement,
    /// Dimensions of a polyhedron do not match its statements
    DimensionMismatch,
    /// Parameter lists disagree
    ParameterMismatch,
    /// A statement has no integer points
    EmptyDomain,
    /// A scheduler option is out of range
    InvalidOption,
}

/// Error while parsing the textual (isl-like) form.
#[derive(Error, Debug, Clone)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// Expected tokens (if applicable)
    pub expected: Vec<String>,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Unexpected character in the input
    UnexpectedChar,
    /// Unexpected token
    UnexpectedToken,
    /// Expected an identifier
    ExpectedIdentifier,
    /// Expression is not affine (product of two variables, ...)
    NonAffine,
    /// Name not declared in the enclosing tuple or parameter list
    UnknownName,
    /// Unexpected end of input
    UnexpectedEof,
}

/// Error reported by a solver backend.
#[derive(Error, Debug, Clone)]
pub struct SolverError {
    /// The error message
    pub message: String,
    /// The kind of solver error
    pub kind: SolverErrorKind,
    /// The backend that failed
    pub backend: String,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.backend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverErrorKind {
    /// Requested backend is not linked into this build
    BackendUnavailable,
    /// The objective is unbounded below
    Unbounded,
    /// Branch-and-bound exceeded its node budget
    NodeLimit,
}

/// Scheduling failure surfaced to the caller.
#[derive(Error, Debug, Clone)]
pub struct ScheduleError {
    /// The error message
    pub message: String,
    /// The kind of scheduling error
    pub kind: ScheduleErrorKind,
}

impl ScheduleError {
    /// Create a new scheduling error.
    pub fn new(kind: ScheduleErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleErrorKind {
    /// No legal schedule could be found
    NoLegalSchedule,
    /// The round cap was reached with dependences left
    IterationCapExceeded,
    /// The wall-clock budget ran out
    TimeBudgetExceeded,
    /// The finished schedule failed the final legality replay
    VerificationFailed,
}

/// Result type using PolySchedError.
pub type PolyResult<T> = Result<T, PolySchedError>;
