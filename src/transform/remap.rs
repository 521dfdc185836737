//! Remapping: original iterators as functions of the schedule.
//!
//! For a statement with `d` iterators the remapping holds one integer row per
//! iterator over `[schedule values, params, 1]` and a divisor, so that
//!
//! ```text
//! iter_i = (inverse[i] . [sched, params, 1]) / divisor[i]
//! ```

use crate::ir::pir::{PolyStmt, StmtId};
use crate::polyhedral::expr::narrow;
use crate::utils::errors::{InputError, InputErrorKind, PolyResult, PolySchedError};
use crate::utils::matrix::{rat, scale_to_integers};
use num_rational::BigRational;
use num_traits::Zero;

/// Remapping of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StmtRemap {
    pub id: StmtId,
    /// Schedule rows the remapping reads
    pub n_rows: usize,
    pub n_param: usize,
    pub inverse: Vec<Vec<i64>>,
    pub divisors: Vec<i64>,
}

impl StmtRemap {
    /// Recover the iteration point of a schedule point. `None` when a
    /// division is not exact, i.e. the point is not in the image.
    pub fn apply(&self, sched: &[i64], params: &[i64]) -> PolyResult<Option<Vec<i64>>> {
        if sched.len() != self.n_rows || params.len() != self.n_param {
            return Err(InputError::new(
                InputErrorKind::DimensionMismatch,
                format!(
                    "remapping of {} takes {} schedule values and {} parameters, got {} and {}",
                    self.id,
                    self.n_rows,
                    self.n_param,
                    sched.len(),
                    params.len()
                ),
            )
            .into());
        }
        let mut point = Vec::with_capacity(self.inverse.len());
        for (row, &div) in self.inverse.iter().zip(&self.divisors) {
            let mut acc: i128 = 0;
            for (c, v) in row.iter().zip(sched.iter().chain(params).chain(std::iter::once(&1))) {
                acc += *c as i128 * *v as i128;
            }
            if acc % div as i128 != 0 {
                return Ok(None);
            }
            point.push(narrow(acc / div as i128, "remapping")?);
        }
        Ok(Some(point))
    }
}

/// Remapping of every statement, owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remapping {
    pub stmts: Vec<StmtRemap>,
}

impl Remapping {
    /// Build the remapping of scheduled statements.
    pub fn build(stmts: &[PolyStmt], n_param: usize) -> PolyResult<Self> {
        let stmts = stmts
            .iter()
            .map(|s| invert(s, n_param))
            .collect::<PolyResult<Vec<_>>>()?;
        Ok(Self { stmts })
    }

    pub fn get(&self, id: StmtId) -> Option<&StmtRemap> {
        self.stmts.iter().find(|s| s.id == id)
    }

    /// Release the remapping.
    pub fn free(self) {}
}

/// Greedily pick rows whose iterator parts are linearly independent.
fn independent_rows(stmt: &PolyStmt) -> Vec<usize> {
    let depth = stmt.depth();
    let mut picked: Vec<usize> = Vec::with_capacity(depth);
    for r in 0..stmt.schedule.n_out() {
        if picked.len() == depth {
            break;
        }
        let mut trial = picked.clone();
        trial.push(r);
        if stmt.schedule.iterator_matrix(&trial).rank() == trial.len() {
            picked = trial;
        }
    }
    picked
}

fn invert(stmt: &PolyStmt, n_param: usize) -> PolyResult<StmtRemap> {
    let depth = stmt.depth();
    let n_rows = stmt.schedule.n_out();
    let picked = independent_rows(stmt);
    if picked.len() < depth {
        return Err(PolySchedError::Internal(format!(
            "schedule of {} has rank {} below its depth {}",
            stmt.id,
            picked.len(),
            depth
        )));
    }
    let inv = stmt
        .schedule
        .iterator_matrix(&picked)
        .inverse()
        .ok_or_else(|| PolySchedError::Internal(format!("schedule of {} is not invertible", stmt.id)))?;

    let mut inverse = Vec::with_capacity(depth);
    let mut divisors = Vec::with_capacity(depth);
    for i in 0..depth {
        // iter_i = sum_k inv[i][k] * (sched[picked[k]] - params part - constant)
        let mut row = vec![BigRational::zero(); n_rows + n_param + 1];
        for (k, &r) in picked.iter().enumerate() {
            let a = inv.get(i, k).cloned().unwrap_or_else(BigRational::zero);
            if a.is_zero() {
                continue;
            }
            let expr = &stmt.schedule.outputs[r];
            row[r] += &a;
            for p in 0..n_param {
                row[n_rows + p] -= &a * rat(expr.param_coeff(p));
            }
            row[n_rows + n_param] -= &a * rat(expr.constant);
        }
        let (ints, scale) = scale_to_integers(&row)
            .ok_or_else(|| PolySchedError::overflow(format!("remapping of {}", stmt.id)))?;
        inverse.push(ints);
        divisors.push(scale);
    }
    Ok(StmtRemap { id: stmt.id, n_rows, n_param, inverse, divisors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{AffineExpr, AffineMap, IntegerSet};

    fn scheduled(rows: &[&[i64]], depth: usize, n_param: usize) -> PolyStmt {
        let mut stmt = PolyStmt::new(StmtId(0), "S0", IntegerSet::universe(depth, n_param));
        let outputs = rows.iter().map(|r| AffineExpr::from_row(r, depth, n_param)).collect();
        stmt.schedule = AffineMap::from_outputs(depth, n_param, outputs);
        stmt
    }

    #[test]
    fn test_inverts_shifted_fused_schedule() {
        // [i + 1, j, 0]
        let stmt = scheduled(&[&[1, 0, 1], &[0, 1, 0], &[0, 0, 0]], 2, 0);
        let remap = Remapping::build(&[stmt.clone()], 0).unwrap();
        let r = remap.get(StmtId(0)).unwrap();
        assert_eq!(r.inverse, vec![vec![1, 0, 0, -1], vec![0, 1, 0, 0]]);
        assert_eq!(r.divisors, vec![1, 1]);
        for point in [[0, 0], [3, 7], [9, 2]] {
            let sched = stmt.schedule.apply(&point, &[]).unwrap();
            assert_eq!(r.apply(&sched, &[]).unwrap(), Some(point.to_vec()));
        }
    }

    #[test]
    fn test_diamond_rows_need_divisors() {
        // [t - i, t + i]: t = (a + b) / 2, i = (b - a) / 2
        let stmt = scheduled(&[&[1, -1, 0], &[1, 1, 0]], 2, 0);
        let remap = Remapping::build(&[stmt.clone()], 0).unwrap();
        let r = &remap.stmts[0];
        assert_eq!(r.divisors, vec![2, 2]);
        let sched = stmt.schedule.apply(&[5, 2], &[]).unwrap();
        assert_eq!(r.apply(&sched, &[]).unwrap(), Some(vec![5, 2]));
        assert_eq!(r.apply(&[3, 4], &[]).unwrap(), None);
        remap.free();
    }

    #[test]
    fn test_parametric_shift() {
        // [0, N - i]
        let stmt = scheduled(&[&[0, 0, 0], &[-1, 1, 0]], 1, 1);
        let remap = Remapping::build(&[stmt.clone()], 1).unwrap();
        let r = &remap.stmts[0];
        let sched = stmt.schedule.apply(&[4], &[10]).unwrap();
        assert_eq!(r.apply(&sched, &[10]).unwrap(), Some(vec![4]));
    }

    #[test]
    fn test_wrong_point_length_is_an_error() {
        // [0, N - i]
        let stmt = scheduled(&[&[0, 0, 0], &[-1, 1, 0]], 1, 1);
        let remap = Remapping::build(&[stmt], 1).unwrap();
        let r = &remap.stmts[0];
        for (sched, params) in [(vec![0], vec![10]), (vec![0, 6, 1], vec![10]), (vec![0, 6], vec![])] {
            match r.apply(&sched, &params) {
                Err(PolySchedError::Input(e)) => assert_eq!(e.kind, InputErrorKind::DimensionMismatch),
                other => panic!("unexpected result {:?}", other),
            }
        }
        assert_eq!(r.apply(&[0, 6], &[10]).unwrap(), Some(vec![4]));
    }

    #[test]
    fn test_rank_deficient_schedule_is_an_error() {
        let stmt = scheduled(&[&[1, 1, 0], &[2, 2, 0]], 2, 0);
        assert!(Remapping::build(&[stmt], 0).is_err());
    }
}
