//! Polyhedral operations that need a solver: emptiness, sampling, containment.
//!
//! Sets range over all integers while the simplex works on non-negative
//! unknowns, so every column `x` is split into `x+ - x-` first.

use crate::polyhedral::constraint::{Constraint, ConstraintKind, ConstraintSystem};
use crate::polyhedral::expr::{narrow, AffineExpr};
use crate::solver::ilp::{self, Feasibility};
use crate::utils::errors::PolyResult;

/// Branch-and-bound node budget for emptiness questions.
pub const EMPTINESS_NODE_BUDGET: usize = 2_000;

/// Rewrite a system over free columns into one over `2 * n_cols`
/// non-negative columns (`x_k = y_2k - y_2k+1`).
pub fn split_free_columns(sys: &ConstraintSystem) -> ConstraintSystem {
    let n = sys.n_cols();
    let mut out = ConstraintSystem::new(2 * n, 0);
    for c in &sys.constraints {
        let mut expr = AffineExpr::zero(2 * n, 0);
        expr.constant = c.expr.constant;
        for k in 0..n {
            let v = c.expr.col(k);
            expr.coeffs[2 * k] = v;
            expr.coeffs[2 * k + 1] = -v;
        }
        out.add(Constraint::new(expr, c.kind));
    }
    out
}

/// Find an integer point of the system, if one is found within the budget.
///
/// Returns `(dims, params)` of the point.
pub fn sample_point(sys: &ConstraintSystem) -> PolyResult<Feasibility<(Vec<i64>, Vec<i64>)>> {
    let mut simplified = sys.clone();
    simplified.simplify();
    if simplified.is_trivially_infeasible() {
        return Ok(Feasibility::Infeasible);
    }
    let split = split_free_columns(&simplified);
    Ok(match ilp::find_integer_point(&split, EMPTINESS_NODE_BUDGET)? {
        Feasibility::Feasible(y) => {
            let x: Vec<i64> = (0..sys.n_cols()).map(|k| y[2 * k] - y[2 * k + 1]).collect();
            Feasibility::Feasible((x[..sys.n_dim].to_vec(), x[sys.n_dim..].to_vec()))
        }
        Feasibility::Infeasible => Feasibility::Infeasible,
        Feasibility::Unknown => Feasibility::Unknown,
    })
}

/// Integer emptiness; an exhausted budget answers `false` (not proven empty).
pub fn is_integer_empty(sys: &ConstraintSystem) -> PolyResult<bool> {
    Ok(matches!(sample_point(sys)?, Feasibility::Infeasible))
}

/// Rational emptiness via the simplex alone.
pub fn is_rationally_empty(sys: &ConstraintSystem) -> bool {
    let mut simplified = sys.clone();
    simplified.simplify();
    if simplified.is_trivially_infeasible() {
        return true;
    }
    ilp::is_lp_infeasible(&split_free_columns(&simplified))
}

/// Every integer point of `a` satisfies `b`.
///
/// Checked one constraint of `b` at a time: `a` intersected with the integer
/// complement of the constraint must be empty.
pub fn is_subset(a: &ConstraintSystem, b: &ConstraintSystem) -> PolyResult<bool> {
    for c in &b.constraints {
        let complements = match c.kind {
            ConstraintKind::Inequality => c.complement().into_iter().collect::<Vec<_>>(),
            ConstraintKind::Equality => {
                let ge = Constraint::ge_zero(c.expr.clone());
                let le = Constraint::ge_zero(-c.expr.clone());
                ge.complement().into_iter().chain(le.complement()).collect()
            }
        };
        for comp in complements {
            let mut trial = a.clone();
            trial.add(comp);
            if !is_integer_empty(&trial)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Does `expr >= bound` hold for every integer point of the system?
pub fn always_at_least(sys: &ConstraintSystem, expr: &AffineExpr, bound: i64) -> PolyResult<bool> {
    // expr <= bound - 1 must be empty
    let mut trial = sys.clone();
    let mut below = -expr.clone();
    below.constant = narrow(below.constant as i128 + bound as i128 - 1, "bound check")?;
    trial.add(Constraint::ge_zero(below));
    is_integer_empty(&trial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ge(row: &[i64], n_dim: usize, n_param: usize) -> Constraint {
        Constraint::ge_zero(AffineExpr::from_row(row, n_dim, n_param))
    }

    #[test]
    fn test_negative_points_are_found() {
        // -5 <= i <= -3
        let mut sys = ConstraintSystem::new(1, 0);
        sys.add(ge(&[1, 5], 1, 0));
        sys.add(ge(&[-1, -3], 1, 0));
        match sample_point(&sys).unwrap() {
            Feasibility::Feasible((dims, _)) => assert!((-5..=-3).contains(&dims[0])),
            other => panic!("expected a point, got {:?}", other),
        }
    }

    #[test]
    fn test_rational_but_not_integer() {
        // 1 <= 3i <= 2
        let mut sys = ConstraintSystem::new(1, 0);
        sys.add(ge(&[3, -1], 1, 0));
        sys.add(ge(&[-3, 2], 1, 0));
        assert!(is_integer_empty(&sys).unwrap());
        // Simplification tightens 3i >= 1 to i >= 1 before the simplex runs.
        assert!(is_rationally_empty(&sys));
    }

    #[test]
    fn test_always_at_least() {
        // 0 <= i <= N, N >= 0
        let mut sys = ConstraintSystem::new(1, 1);
        sys.add(ge(&[1, 0, 0], 1, 1));
        sys.add(ge(&[-1, 1, 0], 1, 1));
        sys.add(ge(&[0, 1, 0], 1, 1));
        let i_plus_one = AffineExpr::from_row(&[1, 0, 1], 1, 1);
        assert!(always_at_least(&sys, &i_plus_one, 1).unwrap());
        assert!(!always_at_least(&sys, &i_plus_one, 2).unwrap());
    }
}
