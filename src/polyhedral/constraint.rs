//! Linear constraints for polyhedral representation.
//!
//! A constraint is a linear inequality or equality:
//! - Inequality: expr >= 0
//! - Equality: expr = 0
//!
//! `ConstraintSystem` also hosts the variable elimination used by the Farkas
//! step and by projections: Gaussian substitution through equalities and
//! Fourier-Motzkin on inequalities. All combinations go through i128 and
//! report overflow as an error.

use crate::polyhedral::expr::{floor_div_i64, AffineExpr};
use crate::utils::errors::PolyResult;
use log::trace;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;

/// A linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (constraint is: expr >= 0 or expr = 0)
    pub expr: AffineExpr,
    /// Kind of constraint
    pub kind: ConstraintKind,
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Greater than or equal: expr >= 0
    Inequality,
    /// Equal: expr = 0
    Equality,
}

impl Constraint {
    /// Create a new constraint.
    pub fn new(expr: AffineExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    /// Create an inequality constraint: expr >= 0
    pub fn ge_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Inequality)
    }

    /// Create an equality constraint: expr = 0
    pub fn eq_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Equality)
    }

    /// Create a constraint: lhs >= rhs
    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(lhs - rhs)
    }

    /// Create a constraint: lhs <= rhs
    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(rhs - lhs)
    }

    /// Create a constraint: lhs = rhs
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::eq_zero(lhs - rhs)
    }

    /// Create a lower bound constraint: var >= lower
    pub fn lower_bound(dim: usize, lower: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = AffineExpr::var(dim, n_dim, n_param);
        expr.constant = -lower;
        Self::ge_zero(expr)
    }

    /// Create an upper bound constraint: var <= upper
    pub fn upper_bound(dim: usize, upper: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = -AffineExpr::var(dim, n_dim, n_param);
        expr.constant = upper;
        Self::ge_zero(expr)
    }

    /// Check if this is an equality constraint.
    pub fn is_equality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Equality)
    }

    /// Check if this is an inequality constraint.
    pub fn is_inequality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Inequality)
    }

    /// Check if this constraint is satisfied by the given point.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        let value = self.expr.evaluate_wide(dim_values, param_values);
        match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
        }
    }

    /// The integer complement of an inequality: `expr >= 0` becomes `-expr - 1 >= 0`.
    pub fn complement(&self) -> Option<Self> {
        match self.kind {
            ConstraintKind::Inequality => {
                let mut neg = -self.expr.clone();
                neg.constant -= 1;
                Some(Self::ge_zero(neg))
            }
            ConstraintKind::Equality => None,
        }
    }

    /// Get the number of dimensions.
    pub fn n_dim(&self) -> usize {
        self.expr.n_dim()
    }

    /// Get the number of parameters.
    pub fn n_param(&self) -> usize {
        self.expr.n_param()
    }

    /// Normalized copy. `None` when the row is trivially false, `Some(None)`
    /// when it is trivially true.
    fn normalized(&self) -> Option<Option<Self>> {
        let g = self.expr.coeff_gcd();
        if self.expr.is_constant() {
            let ok = match self.kind {
                ConstraintKind::Inequality => self.expr.constant >= 0,
                ConstraintKind::Equality => self.expr.constant == 0,
            };
            return if ok { Some(None) } else { None };
        }
        let mut expr = self.expr.clone();
        match self.kind {
            ConstraintKind::Equality => {
                if expr.constant % g != 0 {
                    return None;
                }
                for c in expr.coeffs.iter_mut().chain(expr.param_coeffs.iter_mut()) {
                    *c /= g;
                }
                expr.constant /= g;
                // Canonical sign: first non-zero coefficient positive.
                let lead = expr.to_row().into_iter().find(|&c| c != 0).unwrap_or(1);
                if lead < 0 {
                    expr = -expr;
                }
            }
            ConstraintKind::Inequality => {
                for c in expr.coeffs.iter_mut().chain(expr.param_coeffs.iter_mut()) {
                    *c /= g;
                }
                expr.constant = floor_div_i64(expr.constant, g);
            }
        }
        Some(Some(Self::new(expr, self.kind)))
    }

    /// Convert to string with given names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let expr_str = self.expr.to_string_with_names(dim_names, param_names);
        match self.kind {
            ConstraintKind::Inequality => format!("{} >= 0", expr_str),
            ConstraintKind::Equality => format!("{} = 0", expr_str),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

/// A system of constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// All constraints in the system
    pub constraints: Vec<Constraint>,
    /// Number of dimensions
    pub n_dim: usize,
    /// Number of parameters
    pub n_param: usize,
}

impl ConstraintSystem {
    /// Create an empty constraint system.
    pub fn new(n_dim: usize, n_param: usize) -> Self {
        Self {
            constraints: Vec::new(),
            n_dim,
            n_param,
        }
    }

    /// The canonical infeasible system `-1 >= 0`.
    pub fn infeasible(n_dim: usize, n_param: usize) -> Self {
        let mut sys = Self::new(n_dim, n_param);
        sys.add(Constraint::ge_zero(AffineExpr::constant(-1, n_dim, n_param)));
        sys
    }

    /// Add a constraint.
    pub fn add(&mut self, constraint: Constraint) {
        debug_assert_eq!(constraint.n_dim(), self.n_dim);
        debug_assert_eq!(constraint.n_param(), self.n_param);
        self.constraints.push(constraint);
    }

    /// Add multiple constraints.
    pub fn add_all(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        for c in constraints {
            self.add(c);
        }
    }

    /// Conjunction of two systems over the same space.
    pub fn intersect(&self, other: &ConstraintSystem) -> ConstraintSystem {
        let mut out = self.clone();
        out.add_all(other.constraints.iter().cloned());
        out
    }

    /// Get all equality constraints.
    pub fn equalities(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_equality())
    }

    /// Get all inequality constraints.
    pub fn inequalities(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_inequality())
    }

    /// Check if a point satisfies all constraints.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(dim_values, param_values))
    }

    /// Get the number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// `true` when the system has no constraints at all (the universe).
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of variable columns (dimensions plus parameters).
    pub fn n_cols(&self) -> usize {
        self.n_dim + self.n_param
    }

    /// `true` if some row is a constant contradiction.
    pub fn is_trivially_infeasible(&self) -> bool {
        self.constraints.iter().any(|c| c.expr.is_constant() && c.normalized().is_none())
    }

    /// Normalize every row, drop tautologies and duplicates, keep the tightest
    /// of parallel inequalities and merge opposite pairs into equalities.
    ///
    /// A contradiction collapses the system to [`ConstraintSystem::infeasible`].
    pub fn simplify(&mut self) {
        let mut eqs: Vec<Constraint> = Vec::new();
        let mut tightest: HashMap<Vec<i64>, i64> = HashMap::new();
        let mut order: Vec<Vec<i64>> = Vec::new();
        for c in &self.constraints {
            let Some(norm) = c.normalized() else {
                *self = Self::infeasible(self.n_dim, self.n_param);
                return;
            };
            let Some(norm) = norm else { continue };
            if norm.is_equality() {
                if !eqs.contains(&norm) {
                    eqs.push(norm);
                }
                continue;
            }
            let mut key = norm.expr.to_row();
            key.pop();
            match tightest.get_mut(&key) {
                Some(k) => *k = (*k).min(norm.expr.constant),
                None => {
                    tightest.insert(key.clone(), norm.expr.constant);
                    order.push(key);
                }
            }
        }

        let mut ineqs = Vec::new();
        let mut merged: Vec<Vec<i64>> = Vec::new();
        for key in &order {
            if merged.contains(key) {
                continue;
            }
            let c = tightest[key];
            let neg: Vec<i64> = key.iter().map(|&v| -v).collect();
            if let Some(&c2) = tightest.get(&neg) {
                // a.x + c >= 0 and -a.x + c2 >= 0 means -c <= a.x <= c2
                if c + c2 < 0 {
                    *self = Self::infeasible(self.n_dim, self.n_param);
                    return;
                }
                if c + c2 == 0 {
                    let mut row = key.clone();
                    row.push(c);
                    let eq = Constraint::eq_zero(AffineExpr::from_row(&row, self.n_dim, self.n_param));
                    if let Some(Some(eq)) = eq.normalized() {
                        if !eqs.contains(&eq) {
                            eqs.push(eq);
                        }
                    }
                    merged.push(key.clone());
                    merged.push(neg);
                    continue;
                }
            }
            let mut row = key.clone();
            row.push(c);
            ineqs.push(Constraint::ge_zero(AffineExpr::from_row(&row, self.n_dim, self.n_param)));
        }

        self.constraints = eqs;
        self.constraints.extend(ineqs);
    }

    /// Eliminate one column (dimension or parameter, flat index) so that no
    /// row mentions it afterwards. Uses an equality when one involves the
    /// column, Fourier-Motzkin otherwise. The column stays in the layout.
    pub fn eliminate(&self, col: usize) -> PolyResult<ConstraintSystem> {
        let pivot = self
            .constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_equality() && c.expr.col(col) != 0)
            .min_by_key(|(_, c)| c.expr.col(col).unsigned_abs())
            .map(|(i, _)| i);

        let mut out = ConstraintSystem::new(self.n_dim, self.n_param);
        if let Some(p) = pivot {
            let eq = &self.constraints[p].expr;
            let a = eq.col(col);
            for (i, c) in self.constraints.iter().enumerate() {
                if i == p {
                    continue;
                }
                let b = c.expr.col(col);
                if b == 0 {
                    out.add(c.clone());
                    continue;
                }
                // |a| * c - sign(a) * b * eq keeps the inequality direction.
                let expr = c.expr.combine(a.abs(), eq, -a.signum() * b)?;
                out.add(Constraint::new(expr, c.kind));
            }
        } else {
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for c in &self.constraints {
                match c.expr.col(col) {
                    0 => out.add(c.clone()),
                    v if v > 0 => pos.push(&c.expr),
                    _ => neg.push(&c.expr),
                }
            }
            for p in &pos {
                for n in &neg {
                    let a = p.col(col);
                    let b = -n.col(col);
                    let expr = p.combine(b, n, a)?;
                    out.add(Constraint::ge_zero(expr));
                }
            }
        }
        out.simplify();
        Ok(out)
    }

    /// Eliminate a set of columns, cheapest first, then drop the eliminated
    /// dimensions from the layout. Parameters are zeroed but kept.
    pub fn project_out(&self, cols: &[usize]) -> PolyResult<ConstraintSystem> {
        let mut sys = self.clone();
        sys.simplify();
        let mut remaining: Vec<usize> = cols.to_vec();
        while !remaining.is_empty() {
            if sys.is_trivially_infeasible() {
                break;
            }
            let (idx, _) = remaining
                .iter()
                .enumerate()
                .map(|(i, &col)| (i, sys.elimination_cost(col)))
                .min_by_key(|&(i, cost)| (cost, i))
                .unwrap_or((0, 0));
            let col = remaining.swap_remove(idx);
            sys = sys.eliminate(col)?;
            trace!("eliminated column {} -> {} rows", col, sys.len());
        }
        let mut dims: Vec<usize> = cols.iter().copied().filter(|&c| c < self.n_dim).collect();
        dims.sort_unstable();
        dims.dedup();
        for &d in dims.iter().rev() {
            sys = sys.remove_dim(d);
        }
        Ok(sys)
    }

    fn elimination_cost(&self, col: usize) -> i64 {
        if self.equalities().any(|c| c.expr.col(col) != 0) {
            return -1;
        }
        let pos = self.inequalities().filter(|c| c.expr.col(col) > 0).count() as i64;
        let neg = self.inequalities().filter(|c| c.expr.col(col) < 0).count() as i64;
        pos * neg - pos - neg
    }

    /// Insert `count` unconstrained dimensions at `pos`.
    pub fn insert_dims(&self, pos: usize, count: usize) -> ConstraintSystem {
        ConstraintSystem {
            constraints: self
                .constraints
                .iter()
                .map(|c| Constraint::new(c.expr.insert_dims(pos, count), c.kind))
                .collect(),
            n_dim: self.n_dim + count,
            n_param: self.n_param,
        }
    }

    /// Drop a dimension column. Callers make sure it is no longer referenced.
    pub fn remove_dim(&self, pos: usize) -> ConstraintSystem {
        ConstraintSystem {
            constraints: self
                .constraints
                .iter()
                .map(|c| Constraint::new(c.expr.remove_dim(pos), c.kind))
                .collect(),
            n_dim: self.n_dim.saturating_sub(1),
            n_param: self.n_param,
        }
    }

    /// Re-express the system in a space of `map.len()` dimensions where new
    /// dimension `k` is old dimension `map[k]`.
    pub fn remap_dims(&self, map: &[Option<usize>]) -> ConstraintSystem {
        ConstraintSystem {
            constraints: self
                .constraints
                .iter()
                .map(|c| Constraint::new(c.expr.remap_dims(map), c.kind))
                .collect(),
            n_dim: map.len(),
            n_param: self.n_param,
        }
    }

    /// Pretty print with names, rows joined by `and`.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        self.constraints
            .iter()
            .map(|c| c.to_string_with_names(dim_names, param_names))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}
