//! Polyhedral Intermediate Representation (PIR).
//!
//! The PIR is what the scheduler consumes:
//! - Statements with iteration domains over iterators and parameters
//! - A parameter context shared by every domain
//! - A growing schedule per statement, one row per schedule dimension

use crate::polyhedral::{AffineExpr, AffineMap, Constraint, ConstraintSystem, IntegerSet, Space};
use crate::utils::errors::{InputError, InputErrorKind, PolyResult};
use serde::{Serialize, Deserialize};
use std::collections::HashSet;

/// A unique identifier for PIR statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StmtId(pub u64);

impl StmtId {
    pub fn new(id: u64) -> Self { Self(id) }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A complete polyhedral program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyProgram {
    /// Name of the program/function
    pub name: String,
    /// Symbolic parameters (N, M, K, etc.)
    pub parameters: Vec<String>,
    /// Statements, kept ordered by id
    pub statements: Vec<PolyStmt>,
    /// Context constraints over the parameters (e.g., N >= 0)
    pub context: IntegerSet,
}

impl PolyProgram {
    pub fn new(name: String) -> Self {
        Self {
            name,
            parameters: Vec::new(),
            statements: Vec::new(),
            context: IntegerSet::universe(0, 0),
        }
    }

    /// Declare the parameters. The context defaults to every parameter being
    /// non-negative.
    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        let n_param = parameters.len();
        let mut context = ConstraintSystem::new(0, n_param);
        for p in 0..n_param {
            context.add(Constraint::ge_zero(AffineExpr::param(p, 0, n_param)));
        }
        self.context = IntegerSet::from_constraints(Space::set_with_params(0, n_param), context)
            .with_param_names(parameters.clone());
        self.parameters = parameters;
        self
    }

    /// Replace the parameter context.
    pub fn with_context(mut self, context: IntegerSet) -> Self {
        self.context = context;
        self
    }

    pub fn n_param(&self) -> usize {
        self.parameters.len()
    }

    /// Insert a statement, keeping id order.
    pub fn add_statement(&mut self, stmt: PolyStmt) {
        let at = self.statements.partition_point(|s| s.id <= stmt.id);
        self.statements.insert(at, stmt);
    }

    /// Get a statement by ID.
    pub fn get_stmt(&self, id: StmtId) -> Option<&PolyStmt> {
        self.statements.iter().find(|s| s.id == id)
    }

    /// Get a mutable statement by ID.
    pub fn get_stmt_mut(&mut self, id: StmtId) -> Option<&mut PolyStmt> {
        self.statements.iter_mut().find(|s| s.id == id)
    }

    /// Position of a statement in `statements`.
    pub fn stmt_index(&self, id: StmtId) -> Option<usize> {
        self.statements.iter().position(|s| s.id == id)
    }

    /// Deepest statement.
    pub fn max_depth(&self) -> usize {
        self.statements.iter().map(|s| s.depth()).max().unwrap_or(0)
    }

    /// Reject malformed programs before any scheduling work.
    pub fn validate(&self) -> PolyResult<()> {
        if self.statements.is_empty() {
            return Err(InputError::new(InputErrorKind::EmptyProgram, "program has no statements").into());
        }
        let n_param = self.n_param();
        if self.context.n_param() != n_param || self.context.dim() != 0 {
            return Err(InputError::new(
                InputErrorKind::ParameterMismatch,
                format!("context has {} parameters, program declares {}", self.context.n_param(), n_param),
            )
            .into());
        }
        let mut seen = HashSet::new();
        for stmt in &self.statements {
            if !seen.insert(stmt.id) {
                return Err(InputError::new(
                    InputErrorKind::DuplicateStatement,
                    format!("statement {} is declared twice", stmt.id),
                )
                .into());
            }
            if stmt.domain.n_param() != n_param {
                return Err(InputError::new(
                    InputErrorKind::ParameterMismatch,
                    format!("domain of {} has {} parameters, program declares {}", stmt.id, stmt.domain.n_param(), n_param),
                )
                .into());
            }
            if stmt.schedule.n_in() != stmt.depth() || stmt.schedule.n_param() != n_param {
                return Err(InputError::new(
                    InputErrorKind::DimensionMismatch,
                    format!("schedule space of {} does not match its domain", stmt.id),
                )
                .into());
            }
            if self.domain_in_context(stmt).is_empty()? {
                return Err(InputError::new(
                    InputErrorKind::EmptyDomain,
                    format!("domain of {} has no integer points", stmt.id),
                )
                .into());
            }
        }
        Ok(())
    }

    /// A statement's domain intersected with the parameter context.
    pub fn domain_in_context(&self, stmt: &PolyStmt) -> IntegerSet {
        let lifted = self.context.constraints.insert_dims(0, stmt.depth());
        IntegerSet::from_constraints(stmt.domain.space.clone(), stmt.domain.constraints.intersect(&lifted))
    }
}

/// A polyhedral statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyStmt {
    /// Unique identifier
    pub id: StmtId,
    /// Human-readable name
    pub name: String,
    /// Iteration domain: { [i,j,...] : constraints }
    pub domain: IntegerSet,
    /// Schedule: maps iteration point to logical time
    pub schedule: AffineMap,
}

impl PolyStmt {
    /// A statement with an empty schedule.
    pub fn new(id: StmtId, name: impl Into<String>, domain: IntegerSet) -> Self {
        let schedule = AffineMap::empty(domain.dim(), domain.n_param());
        Self { id, name: name.into(), domain, schedule }
    }

    /// Get the dimensionality of the iteration space.
    pub fn depth(&self) -> usize {
        self.domain.dim()
    }

    /// Iterator names, defaulting to `i0, i1, ...`.
    pub fn iterator_names(&self) -> Vec<String> {
        self.domain.dim_names()
    }
}
