//! Integer sets (polyhedra) for iteration domains.

use crate::polyhedral::space::Space;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::operations;
use crate::utils::errors::PolyResult;
use serde::{Serialize, Deserialize};
use std::fmt;

/// An integer set defined by affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerSet {
    pub space: Space,
    pub constraints: ConstraintSystem,
}

impl IntegerSet {
    pub fn universe(n_dim: usize, n_param: usize) -> Self {
        Self {
            space: Space::set_with_params(n_dim, n_param),
            constraints: ConstraintSystem::new(n_dim, n_param),
        }
    }

    pub fn empty(n_dim: usize, n_param: usize) -> Self {
        Self {
            space: Space::set_with_params(n_dim, n_param),
            constraints: ConstraintSystem::infeasible(n_dim, n_param),
        }
    }

    pub fn from_constraints(space: Space, constraints: ConstraintSystem) -> Self {
        debug_assert_eq!(space.n_dim, constraints.n_dim);
        debug_assert_eq!(space.n_param, constraints.n_param);
        Self { space, constraints }
    }

    pub fn dim(&self) -> usize { self.space.n_dim }
    pub fn n_param(&self) -> usize { self.space.n_param }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        self.constraints.is_satisfied(point, params)
    }

    /// Integer emptiness, decided by branch-and-bound. An exhausted node
    /// budget reports "not empty".
    pub fn is_empty(&self) -> PolyResult<bool> {
        operations::is_integer_empty(&self.constraints)
    }

    pub fn intersect(&self, other: &IntegerSet) -> IntegerSet {
        assert_eq!(self.dim(), other.dim());
        Self {
            space: self.space.clone(),
            constraints: self.constraints.intersect(&other.constraints),
        }
    }

    /// Is every integer point of `self` also in `other`?
    pub fn is_subset(&self, other: &IntegerSet) -> PolyResult<bool> {
        operations::is_subset(&self.constraints, &other.constraints)
    }

    pub fn dim_names(&self) -> Vec<String> { self.space.all_dim_names() }
    pub fn param_names(&self) -> Vec<String> { self.space.all_param_names() }

    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_dim_names(names);
        self
    }

    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_param_names(names);
        self
    }
}

impl fmt::Display for IntegerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names = self.dim_names();
        write!(f, "{{ [{}]", dim_names.join(", "))?;
        if !self.constraints.is_empty() {
            write!(f, " : {}", self.constraints.to_string_with_names(&dim_names, &self.param_names()))?;
        }
        write!(f, " }}")
    }
}
