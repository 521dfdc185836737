//! Affine expressions for polyhedral representation.
//!
//! An affine expression is a linear combination of variables plus a constant:
//! `aff(x) = c1*x1 + ... + cn*xn + p1*N1 + ... + c0`

use crate::utils::errors::{PolyResult, PolySchedError};
use crate::utils::matrix::vector_gcd;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// Integer floor division (rounds toward negative infinity).
pub fn floor_div_i64(a: i64, b: i64) -> i64 {
    if b == 0 { return 0; }
    let d = a / b;
    let r = a % b;
    if (r != 0) && ((r < 0) != (b < 0)) {
        d - 1
    } else {
        d
    }
}

/// Narrow an i128 intermediate back to i64.
pub fn narrow(v: i128, what: &str) -> PolyResult<i64> {
    i64::try_from(v).map_err(|_| PolySchedError::overflow(what.to_string()))
}

/// An affine expression: sum(coeff[i] * var[i]) + sum(param_coeff[k] * param[k]) + constant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each dimension (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: 0,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: value,
            ..Self::zero(n_dim, n_param)
        }
    }

    /// Create an expression for a single dimension variable.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut e = Self::zero(n_dim, n_param);
        if dim < n_dim {
            e.coeffs[dim] = 1;
        }
        e
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut e = Self::zero(n_dim, n_param);
        if param_idx < n_param {
            e.param_coeffs[param_idx] = 1;
        }
        e
    }

    /// Build from a flat row `[dims..., params..., constant]`.
    pub fn from_row(row: &[i64], n_dim: usize, n_param: usize) -> Self {
        debug_assert_eq!(row.len(), n_dim + n_param + 1);
        Self {
            constant: row[n_dim + n_param],
            coeffs: row[..n_dim].to_vec(),
            param_coeffs: row[n_dim..n_dim + n_param].to_vec(),
        }
    }

    /// Flatten to `[dims..., params..., constant]`.
    pub fn to_row(&self) -> Vec<i64> {
        let mut row = Vec::with_capacity(self.n_cols() + 1);
        row.extend_from_slice(&self.coeffs);
        row.extend_from_slice(&self.param_coeffs);
        row.push(self.constant);
        row
    }

    /// Number of variable columns (dimensions plus parameters).
    pub fn n_cols(&self) -> usize {
        self.coeffs.len() + self.param_coeffs.len()
    }

    /// Coefficient of a flat column (dimensions first, then parameters).
    pub fn col(&self, col: usize) -> i64 {
        if col < self.coeffs.len() {
            self.coeffs[col]
        } else {
            self.param_coeff(col - self.coeffs.len())
        }
    }

    /// Set the coefficient of a flat column.
    pub fn set_col(&mut self, col: usize, value: i64) {
        let n_dim = self.coeffs.len();
        if col < n_dim {
            self.coeffs[col] = value;
        } else {
            self.set_param_coeff(col - n_dim, value);
        }
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0) &&
        self.param_coeffs.iter().all(|&c| c == 0)
    }

    /// Check if this expression is zero.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.is_constant()
    }

    /// Get the number of dimensions.
    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Get the number of parameters.
    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Get coefficient for a dimension.
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Get coefficient for a parameter.
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    /// Set coefficient for a dimension.
    pub fn set_coeff(&mut self, dim: usize, value: i64) {
        if dim < self.coeffs.len() {
            self.coeffs[dim] = value;
        }
    }

    /// Set coefficient for a parameter.
    pub fn set_param_coeff(&mut self, idx: usize, value: i64) {
        if idx < self.param_coeffs.len() {
            self.param_coeffs[idx] = value;
        }
    }

    /// Evaluate the expression with i128 accumulation.
    pub fn evaluate_wide(&self, dim_values: &[i64], param_values: &[i64]) -> i128 {
        let mut result = self.constant as i128;
        for (&c, &v) in self.coeffs.iter().zip(dim_values) {
            result += c as i128 * v as i128;
        }
        for (&c, &v) in self.param_coeffs.iter().zip(param_values) {
            result += c as i128 * v as i128;
        }
        result
    }

    /// Evaluate the expression given concrete values.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> PolyResult<i64> {
        narrow(self.evaluate_wide(dim_values, param_values), "expression evaluation")
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> PolyResult<Self> {
        let row = self
            .to_row()
            .into_iter()
            .map(|c| narrow(c as i128 * factor as i128, "expression scaling"))
            .collect::<PolyResult<Vec<_>>>()?;
        Ok(Self::from_row(&row, self.n_dim(), self.n_param()))
    }

    /// `a*self + b*other` with overflow detection.
    pub fn combine(&self, a: i64, other: &Self, b: i64) -> PolyResult<Self> {
        debug_assert_eq!(self.n_dim(), other.n_dim());
        debug_assert_eq!(self.n_param(), other.n_param());
        let row = self
            .to_row()
            .into_iter()
            .zip(other.to_row())
            .map(|(x, y)| narrow(a as i128 * x as i128 + b as i128 * y as i128, "linear combination"))
            .collect::<PolyResult<Vec<_>>>()?;
        Ok(Self::from_row(&row, self.n_dim(), self.n_param()))
    }

    /// Get GCD of the variable coefficients (constant excluded).
    pub fn coeff_gcd(&self) -> i64 {
        let g = vector_gcd(&self.coeffs).abs();
        let g = num_integer::Integer::gcd(&g, &vector_gcd(&self.param_coeffs).abs());
        if g == 0 { 1 } else { g }
    }

    /// Get GCD of all coefficients including the constant.
    pub fn gcd(&self) -> i64 {
        let g = vector_gcd(&self.to_row()).abs();
        if g == 0 { 1 } else { g }
    }

    /// Exact division of every coefficient, `None` if some term is not divisible.
    pub fn exact_div(&self, divisor: i64) -> Option<Self> {
        if divisor == 0 || self.to_row().iter().any(|&c| c % divisor != 0) {
            return None;
        }
        let row: Vec<i64> = self.to_row().iter().map(|&c| c / divisor).collect();
        Some(Self::from_row(&row, self.n_dim(), self.n_param()))
    }

    /// Normalize by dividing by GCD.
    pub fn normalize(&self) -> Self {
        let g = self.gcd();
        if g <= 1 {
            self.clone()
        } else {
            self.exact_div(g).unwrap_or_else(|| self.clone())
        }
    }

    /// Insert `count` zero dimensions at `pos`.
    pub fn insert_dims(&self, pos: usize, count: usize) -> Self {
        let mut coeffs = self.coeffs.clone();
        let at = pos.min(coeffs.len());
        coeffs.splice(at..at, std::iter::repeat(0).take(count));
        Self { constant: self.constant, coeffs, param_coeffs: self.param_coeffs.clone() }
    }

    /// Remove the dimension at `pos` (its coefficient is dropped).
    pub fn remove_dim(&self, pos: usize) -> Self {
        let mut e = self.clone();
        if pos < e.coeffs.len() {
            e.coeffs.remove(pos);
        }
        e
    }

    /// Rebuild the dimension vector: new dimension `k` takes old dimension `map[k]`.
    pub fn remap_dims(&self, map: &[Option<usize>]) -> Self {
        Self {
            constant: self.constant,
            coeffs: map.iter().map(|m| m.map_or(0, |d| self.coeff(d))).collect(),
            param_coeffs: self.param_coeffs.clone(),
        }
    }

    /// Convert to string with given dimension and parameter names.
    ///
    /// Variables come first, then parameters, then the constant.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut out = String::new();
        let terms = self
            .coeffs
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, dim_names.get(i).cloned().unwrap_or_else(|| format!("d{}", i))))
            .chain(self.param_coeffs.iter().enumerate().map(|(i, &c)| {
                (c, param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i)))
            }));
        for (c, name) in terms.filter(|(c, _)| *c != 0) {
            let mag = c.unsigned_abs();
            if out.is_empty() {
                if c < 0 {
                    out.push('-');
                }
            } else {
                out.push_str(if c < 0 { " - " } else { " + " });
            }
            if mag != 1 {
                out.push_str(&format!("{}*", mag));
            }
            out.push_str(&name);
        }
        if out.is_empty() {
            return self.constant.to_string();
        }
        if self.constant > 0 {
            out.push_str(&format!(" + {}", self.constant));
        } else if self.constant < 0 {
            out.push_str(&format!(" - {}", self.constant.unsigned_abs()));
        }
        out
    }
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        assert_eq!(self.coeffs.len(), other.coeffs.len());
        assert_eq!(self.param_coeffs.len(), other.param_coeffs.len());
        Self {
            constant: self.constant + other.constant,
            coeffs: self.coeffs.iter().zip(&other.coeffs)
                .map(|(&a, &b)| a + b).collect(),
            param_coeffs: self.param_coeffs.iter().zip(&other.param_coeffs)
                .map(|(&a, &b)| a + b).collect(),
        }
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            constant: -self.constant,
            coeffs: self.coeffs.iter().map(|&c| -c).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| -c).collect(),
        }
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_constant() {
        let expr = AffineExpr::constant(5, 2, 1);
        assert!(expr.is_constant());
        assert_eq!(expr.evaluate(&[1, 2], &[3]).unwrap(), 5);
    }

    #[test]
    fn test_add_sub() {
        let e1 = AffineExpr::var(0, 2, 0);
        let e2 = AffineExpr::var(1, 2, 0);
        assert_eq!((e1.clone() + e2.clone()).evaluate(&[3, 4], &[]).unwrap(), 7);
        assert_eq!((e1 - e2).evaluate(&[3, 4], &[]).unwrap(), -1);
    }

    #[test]
    fn test_scale_overflow() {
        let expr = AffineExpr::constant(i64::MAX / 2 + 1, 1, 0);
        assert!(matches!(expr.scale(2), Err(PolySchedError::Overflow(_))));
        assert_eq!(AffineExpr::var(0, 1, 0).scale(3).unwrap().coeffs, vec![3]);
    }

    #[test]
    fn test_row_round_trip_layout() {
        let e = AffineExpr::from_row(&[1, -2, 3, 4], 2, 1);
        assert_eq!(e.coeffs, vec![1, -2]);
        assert_eq!(e.param_coeffs, vec![3]);
        assert_eq!(e.constant, 4);
        assert_eq!(e.col(2), 3);
    }

    #[test]
    fn test_normalize() {
        let e = AffineExpr::from_row(&[2, 4, -6], 2, 0);
        assert_eq!(e.normalize().to_row(), vec![1, 2, -3]);
        assert_eq!(e.coeff_gcd(), 2);
    }

    #[test]
    fn test_display() {
        let e = AffineExpr::from_row(&[2, -1, 1, 5], 2, 1);
        assert_eq!(e.to_string_with_names(&names(&["i", "j"]), &names(&["N"])), "2*i - j + N + 5");
        let e = AffineExpr::from_row(&[0, -1, 0, -3], 2, 1);
        assert_eq!(e.to_string_with_names(&names(&["i", "j"]), &names(&["N"])), "-j - 3");
        assert_eq!(AffineExpr::zero(1, 0).to_string(), "0");
    }

    #[test]
    fn test_insert_and_remap_dims() {
        let e = AffineExpr::from_row(&[1, 2, 7], 2, 0);
        assert_eq!(e.insert_dims(1, 2).coeffs, vec![1, 0, 0, 2]);
        assert_eq!(e.remap_dims(&[Some(1), None, Some(0)]).coeffs, vec![2, 0, 1]);
        assert_eq!(e.remove_dim(0).coeffs, vec![2]);
    }
}
