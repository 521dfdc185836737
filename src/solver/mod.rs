//! Solver abstraction.
//!
//! Every backend answers the same question: the lexicographic minimum of a
//! list of objectives over the non-negative integer points of a constraint
//! system. Infeasibility is an ordinary `Ok(None)`.

pub mod simplex;
pub mod ilp;

use crate::options::SolverKind;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::utils::errors::{PolyResult, SolverError, SolverErrorKind};

pub use ilp::ExactSolver;
pub use simplex::LpSolver;

/// A lexicographic integer program over non-negative unknowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlpProblem {
    /// Constraints over the unknowns (all columns are dimensions)
    pub constraints: ConstraintSystem,
    /// Objectives, most significant first
    pub objectives: Vec<Vec<i64>>,
}

impl IlpProblem {
    pub fn new(n_vars: usize) -> Self {
        Self {
            constraints: ConstraintSystem::new(n_vars, 0),
            objectives: Vec::new(),
        }
    }

    pub fn n_vars(&self) -> usize {
        self.constraints.n_dim
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    pub fn add_all(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.constraints.add_all(constraints);
    }

    pub fn push_objective(&mut self, objective: Vec<i64>) {
        debug_assert_eq!(objective.len(), self.n_vars());
        self.objectives.push(objective);
    }
}

/// Capability interface implemented by every backend.
pub trait Solver: Send + Sync {
    /// Backend name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Lexicographic minimum, or `None` when no integer point exists.
    fn lexmin(&self, problem: &IlpProblem) -> PolyResult<Option<Vec<i64>>>;
}

/// Instantiate the backend for `kind`.
///
/// External backends are not linked into this build and are rejected here,
/// before any scheduling work starts.
pub fn backend(kind: SolverKind) -> PolyResult<Box<dyn Solver>> {
    match kind {
        SolverKind::Exact => Ok(Box::new(ExactSolver::new())),
        SolverKind::Lp => Ok(Box::new(LpSolver::new())),
        SolverKind::Glpk | SolverKind::Gurobi => Err(SolverError {
            message: "backend is not linked into this build".to_string(),
            kind: SolverErrorKind::BackendUnavailable,
            backend: kind.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::PolySchedError;

    #[test]
    fn test_backend_selection() {
        assert_eq!(backend(SolverKind::Exact).unwrap().name(), "exact");
        assert_eq!(backend(SolverKind::Lp).unwrap().name(), "lp");
        match backend(SolverKind::Gurobi) {
            Err(PolySchedError::Solver(e)) => {
                assert_eq!(e.kind, SolverErrorKind::BackendUnavailable);
                assert_eq!(e.backend, "gurobi");
            }
            _ => panic!("gurobi should be unavailable"),
        }
    }
}
