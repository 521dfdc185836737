//! Exact rational simplex.
//!
//! Dense two-phase tableau over `BigRational` with Bland's rule, so pivoting
//! always terminates. Problems are `min c.x` subject to a
//! [`ConstraintSystem`] whose every column is a non-negative unknown.

use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::expr::AffineExpr;
use crate::solver::ilp::ExactSolver;
use crate::solver::{IlpProblem, Solver};
use crate::utils::errors::{PolyResult, SolverError, SolverErrorKind};
use crate::utils::matrix::{rat, scale_to_integers};
use log::{debug, trace};
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

/// Result of one linear program.
#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Infeasible,
    Unbounded,
    Optimal {
        point: Vec<BigRational>,
        value: BigRational,
    },
}

struct Tableau {
    /// Constraint rows, last entry is the right-hand side.
    rows: Vec<Vec<BigRational>>,
    basis: Vec<usize>,
    n_cols: usize,
}

impl Tableau {
    fn pivot(&mut self, r: usize, c: usize, obj: &mut [BigRational]) {
        let p = self.rows[r][c].clone();
        for v in self.rows[r].iter_mut() {
            if !v.is_zero() {
                *v = &*v / &p;
            }
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i != r && !row[c].is_zero() {
                let f = row[c].clone();
                eliminate(row, &f, &pivot_row);
            }
        }
        if !obj[c].is_zero() {
            let f = obj[c].clone();
            eliminate(obj, &f, &pivot_row);
        }
        self.basis[r] = c;
    }

    /// Reduced-cost row for `cost` against the current basis.
    fn objective_row(&self, cost: &[BigRational]) -> Vec<BigRational> {
        let mut obj = cost.to_vec();
        obj.resize(self.n_cols + 1, BigRational::zero());
        for (row, &b) in self.rows.iter().zip(&self.basis) {
            if !obj[b].is_zero() {
                let f = obj[b].clone();
                eliminate(&mut obj, &f, row);
            }
        }
        obj
    }

    /// Run primal simplex with Bland's rule on columns `< allowed`.
    /// Returns `false` when the objective is unbounded.
    fn optimize(&mut self, obj: &mut [BigRational], allowed: usize) -> bool {
        let mut pivots = 0usize;
        loop {
            let Some(enter) = (0..allowed).find(|&j| obj[j].is_negative()) else {
                trace!("simplex optimal after {} pivots", pivots);
                return true;
            };
            let mut leave: Option<(usize, BigRational)> = None;
            for (i, row) in self.rows.iter().enumerate() {
                if !row[enter].is_positive() {
                    continue;
                }
                let ratio = &row[self.n_cols] / &row[enter];
                let better = match &leave {
                    None => true,
                    Some((li, lr)) => ratio < *lr || (ratio == *lr && self.basis[i] < self.basis[*li]),
                };
                if better {
                    leave = Some((i, ratio));
                }
            }
            let Some((r, _)) = leave else {
                return false;
            };
            self.pivot(r, enter, obj);
            pivots += 1;
        }
    }
}

fn eliminate(row: &mut [BigRational], factor: &BigRational, pivot_row: &[BigRational]) {
    for (v, pv) in row.iter_mut().zip(pivot_row) {
        if !pv.is_zero() {
            *v -= factor * pv;
        }
    }
}

/// Minimize `objective . x` over the non-negative points of `sys`.
pub fn minimize(sys: &ConstraintSystem, objective: &[i64]) -> LpOutcome {
    let n = sys.n_cols();
    let m = sys.constraints.len();
    let n_slack = sys.inequalities().count();

    // Row i: a.x - s_i = -c (inequality) or a.x = -c (equality), sign-fixed so
    // the right-hand side is non-negative. Rows whose slack ends up with +1
    // start with the slack basic; the others get an artificial.
    let mut rows = Vec::with_capacity(m);
    let mut basis = Vec::with_capacity(m);
    let mut needs_artificial = Vec::new();
    let mut slack = n;
    for (i, c) in sys.constraints.iter().enumerate() {
        let mut row = vec![BigRational::zero(); n + n_slack + 1];
        for (k, v) in row.iter_mut().take(n).enumerate() {
            let a = c.expr.col(k);
            if a != 0 {
                *v = rat(a);
            }
        }
        let mut rhs = -c.expr.constant;
        let slack_col = if c.is_inequality() {
            row[slack] = rat(-1);
            slack += 1;
            Some(slack - 1)
        } else {
            None
        };
        let negate = match slack_col {
            Some(_) => rhs <= 0,
            None => rhs < 0,
        };
        if negate {
            for v in row.iter_mut() {
                if !v.is_zero() {
                    *v = -v.clone();
                }
            }
            rhs = -rhs;
        }
        row[n + n_slack] = rat(rhs);
        match slack_col {
            Some(s) if negate => basis.push(s),
            _ => {
                basis.push(usize::MAX);
                needs_artificial.push(i);
            }
        }
        rows.push(row);
    }

    let n_real = n + n_slack;
    let n_art = needs_artificial.len();
    let mut tab = Tableau { rows, basis, n_cols: n_real + n_art };
    for row in tab.rows.iter_mut() {
        let rhs = row.pop().unwrap_or_else(BigRational::zero);
        row.resize(n_real + n_art, BigRational::zero());
        row.push(rhs);
    }
    for (a, &i) in needs_artificial.iter().enumerate() {
        tab.rows[i][n_real + a] = rat(1);
        tab.basis[i] = n_real + a;
    }

    if n_art > 0 {
        let mut cost = vec![BigRational::zero(); n_real];
        cost.extend(std::iter::repeat(rat(1)).take(n_art));
        let mut obj = tab.objective_row(&cost);
        tab.optimize(&mut obj, n_real);
        if !obj[tab.n_cols].is_zero() {
            return LpOutcome::Infeasible;
        }
        // Drive zero-valued artificials out of the basis, dropping redundant rows.
        let mut r = 0;
        while r < tab.rows.len() {
            if tab.basis[r] >= n_real {
                match (0..n_real).find(|&j| !tab.rows[r][j].is_zero()) {
                    Some(j) => {
                        let mut dummy = vec![BigRational::zero(); tab.n_cols + 1];
                        tab.pivot(r, j, &mut dummy);
                    }
                    None => {
                        tab.rows.remove(r);
                        tab.basis.remove(r);
                        continue;
                    }
                }
            }
            r += 1;
        }
        for row in tab.rows.iter_mut() {
            let rhs = row.pop().unwrap_or_else(BigRational::zero);
            row.truncate(n_real);
            row.push(rhs);
        }
        tab.n_cols = n_real;
    }

    let cost: Vec<BigRational> = (0..n_real)
        .map(|j| if j < n { rat(objective.get(j).copied().unwrap_or(0)) } else { BigRational::zero() })
        .collect();
    let mut obj = tab.objective_row(&cost);
    if !tab.optimize(&mut obj, n_real) {
        return LpOutcome::Unbounded;
    }
    let mut point = vec![BigRational::zero(); n];
    for (row, &b) in tab.rows.iter().zip(&tab.basis) {
        if b < n {
            point[b] = row[tab.n_cols].clone();
        }
    }
    LpOutcome::Optimal { value: -obj[tab.n_cols].clone(), point }
}

/// Lexicographic minimization over the LP relaxation.
///
/// The final rational point is scaled by the lcm of its denominators; if the
/// scaled point leaves the feasible region the exact backend takes over.
pub struct LpSolver {
    fallback: ExactSolver,
}

impl LpSolver {
    pub fn new() -> Self {
        Self { fallback: ExactSolver::new() }
    }

    fn relaxed_lexmin(&self, problem: &IlpProblem) -> Option<Option<Vec<BigRational>>> {
        let mut sys = problem.constraints.clone();
        let n = sys.n_cols();
        let mut last = None;
        let zero = vec![0; n];
        let stages: Vec<&[i64]> = if problem.objectives.is_empty() {
            vec![zero.as_slice()]
        } else {
            problem.objectives.iter().map(|o| o.as_slice()).collect()
        };
        for obj in stages {
            match minimize(&sys, obj) {
                LpOutcome::Infeasible => return Some(None),
                LpOutcome::Unbounded => return None,
                LpOutcome::Optimal { point, value } => {
                    // fix q*obj.x - p = 0 for value p/q
                    let p = value.numer().to_i64()?;
                    let q = value.denom().to_i64()?;
                    let mut fix = AffineExpr::zero(n, 0);
                    for (k, &c) in obj.iter().enumerate() {
                        fix.coeffs[k] = c.checked_mul(q)?;
                    }
                    fix.constant = -p;
                    sys.add(Constraint::eq_zero(fix));
                    last = Some(point);
                }
            }
        }
        Some(last)
    }
}

impl Default for LpSolver {
    fn default() -> Self { Self::new() }
}

impl Solver for LpSolver {
    fn name(&self) -> &'static str {
        "lp"
    }

    fn lexmin(&self, problem: &IlpProblem) -> PolyResult<Option<Vec<i64>>> {
        match self.relaxed_lexmin(problem) {
            Some(None) => Ok(None),
            Some(Some(point)) => {
                if let Some((scaled, factor)) = scale_to_integers(&point) {
                    if problem.constraints.is_satisfied(&scaled, &[]) {
                        if factor != 1 {
                            debug!("lp backend scaled solution by {}", factor);
                        }
                        return Ok(Some(scaled));
                    }
                }
                debug!("lp relaxation not integral after scaling, using exact backend");
                self.fallback.lexmin(problem)
            }
            None => Err(SolverError {
                message: "objective unbounded or coefficients overflowed".to_string(),
                kind: SolverErrorKind::Unbounded,
                backend: self.name().to_string(),
            }
            .into()),
        }
    }
}
