//! Affine maps for schedules.
//!
//! A statement's schedule is an affine map from its iteration space to a
//! multidimensional logical time; each output is one schedule row.

use crate::polyhedral::space::Space;
use crate::polyhedral::expr::AffineExpr;
use crate::utils::errors::PolyResult;
use crate::utils::matrix::RationalMatrix;
use serde::{Serialize, Deserialize};
use std::fmt;

/// An affine map from one space to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    pub space: Space,
    /// Output expressions (one per output dimension)
    pub outputs: Vec<AffineExpr>,
}

impl AffineMap {
    /// A map with no outputs yet.
    pub fn empty(n_in: usize, n_param: usize) -> Self {
        Self {
            space: Space::map_with_params(n_in, 0, n_param),
            outputs: Vec::new(),
        }
    }

    /// Create an identity map of given dimension.
    pub fn identity(n_dim: usize, n_param: usize) -> Self {
        let outputs = (0..n_dim)
            .map(|i| AffineExpr::var(i, n_dim, n_param))
            .collect();
        Self::from_outputs(n_dim, n_param, outputs)
    }

    /// Create from output expressions.
    pub fn from_outputs(n_in: usize, n_param: usize, outputs: Vec<AffineExpr>) -> Self {
        Self {
            space: Space::map_with_params(n_in, outputs.len(), n_param),
            outputs,
        }
    }

    /// Get input dimensions.
    pub fn n_in(&self) -> usize { self.space.n_in }

    /// Get output dimensions.
    pub fn n_out(&self) -> usize { self.outputs.len() }

    /// Get number of parameters.
    pub fn n_param(&self) -> usize { self.space.n_param }

    /// Append an output row.
    pub fn push_row(&mut self, expr: AffineExpr) {
        debug_assert_eq!(expr.n_dim(), self.n_in());
        self.outputs.push(expr);
        self.space.n_dim = self.outputs.len();
    }

    /// Replace an output row.
    pub fn set_row(&mut self, row: usize, expr: AffineExpr) {
        if let Some(slot) = self.outputs.get_mut(row) {
            *slot = expr;
        }
    }

    /// Apply the map to a point.
    pub fn apply(&self, input: &[i64], params: &[i64]) -> PolyResult<Vec<i64>> {
        self.outputs.iter()
            .map(|expr| expr.evaluate(input, params))
            .collect()
    }

    /// Iterator coefficients of the given rows, as a rational matrix.
    pub fn iterator_matrix(&self, rows: &[usize]) -> RationalMatrix {
        let data = rows
            .iter()
            .filter_map(|&r| self.outputs.get(r))
            .map(|e| e.coeffs.clone())
            .collect();
        RationalMatrix::from_vec(data, self.n_in())
    }

    /// Rank of the iterator part of all rows.
    pub fn rank(&self) -> usize {
        let rows: Vec<usize> = (0..self.n_out()).collect();
        self.iterator_matrix(&rows).rank()
    }

    /// Print as `[i, j] -> [e0, e1, ...]`.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let outs: Vec<String> = self
            .outputs
            .iter()
            .map(|e| e.to_string_with_names(dim_names, param_names))
            .collect();
        format!("[{}] -> [{}]", dim_names.join(", "), outs.join(", "))
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = (0..self.n_in()).map(|i| format!("i{}", i)).collect();
        write!(f, "{}", self.to_string_with_names(&dims, &self.space.all_param_names()))
    }
}
