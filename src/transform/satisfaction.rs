//! Dependence satisfaction.
//!
//! While rows are emitted every dependence keeps a residual: the pairs the
//! rows so far have not strictly ordered. A row must be non-negative on the
//! residual; afterwards only the pairs on which it is zero stay. The
//! dependence is satisfied once its residual has no integer point.
//!
//! The same refinement replayed over a finished schedule gives satisfaction
//! levels, the rows that carry dependences, and the final legality check.

use crate::analysis::DependenceRelation;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::operations;
use crate::utils::errors::PolyResult;

/// What one row does to one dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEffect {
    /// Some remaining pair has a negative difference
    Violated,
    /// Every remaining pair has difference zero
    Weak,
    /// At least one remaining pair is strictly ordered
    Carried,
    /// The dependence was already satisfied
    Done,
}

/// Classify `diff` (target row minus source row over the pair space) on a
/// residual.
pub fn row_effect(residual: &ConstraintSystem, diff: &AffineExpr) -> PolyResult<RowEffect> {
    if !operations::always_at_least(residual, diff, 0)? {
        return Ok(RowEffect::Violated);
    }
    let mut strict = residual.clone();
    let mut shifted = diff.clone();
    shifted.constant -= 1;
    strict.add(Constraint::ge_zero(shifted));
    if operations::is_integer_empty(&strict)? {
        Ok(RowEffect::Weak)
    } else {
        Ok(RowEffect::Carried)
    }
}

/// The pairs of `residual` on which `diff` is zero.
pub fn refine(residual: &ConstraintSystem, diff: &AffineExpr) -> ConstraintSystem {
    let mut out = residual.clone();
    out.add(Constraint::eq_zero(diff.clone()));
    out.simplify();
    out
}

/// Progress of one dependence through the rows emitted so far.
#[derive(Debug, Clone)]
pub struct DepState {
    /// Source statement position
    pub src: usize,
    /// Target statement position
    pub tgt: usize,
    /// Pairs not strictly ordered by any row so far
    pub residual: ConstraintSystem,
    /// Residual when the current band started
    pub band_residual: ConstraintSystem,
    /// Row at which the last pair got ordered
    pub satisfied_at: Option<usize>,
}

impl DepState {
    pub fn new(src: usize, tgt: usize, relation: &DependenceRelation) -> Self {
        let pairs = relation.constraints().clone();
        Self { src, tgt, residual: pairs.clone(), band_residual: pairs, satisfied_at: None }
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied_at.is_some()
    }

    /// Was the dependence still open when the current band started?
    pub fn active_in_band(&self) -> bool {
        !self.band_residual.is_trivially_infeasible()
    }

    pub fn start_band(&mut self) {
        self.band_residual = if self.is_satisfied() {
            ConstraintSystem::infeasible(self.residual.n_dim, self.residual.n_param)
        } else {
            self.residual.clone()
        };
    }

    /// Account for row `row` with the given difference.
    pub fn advance(&mut self, row: usize, diff: &AffineExpr) -> PolyResult<RowEffect> {
        if self.is_satisfied() {
            return Ok(RowEffect::Done);
        }
        let effect = row_effect(&self.residual, diff)?;
        if effect == RowEffect::Carried {
            self.residual = refine(&self.residual, diff);
            if operations::is_integer_empty(&self.residual)? {
                self.satisfied_at = Some(row);
            }
        }
        Ok(effect)
    }
}

/// Pairs of `relation` left open by the first `upto` rows of a legal
/// schedule.
pub fn residual_before(
    relation: &DependenceRelation,
    src_rows: &[AffineExpr],
    tgt_rows: &[AffineExpr],
    upto: usize,
) -> ConstraintSystem {
    let mut residual = relation.constraints().clone();
    for (s, t) in src_rows.iter().zip(tgt_rows).take(upto) {
        residual.add(Constraint::eq_zero(relation.difference(s, t)));
    }
    residual.simplify();
    residual
}

/// Outcome of replaying a finished schedule.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    /// Satisfaction row per dependence (`None`: never fully ordered)
    pub levels: Vec<Option<usize>>,
    /// Per row: does it strictly order some pair
    pub carried: Vec<bool>,
    /// First `(dependence, row)` whose difference went negative
    pub violation: Option<(usize, usize)>,
}

impl Replay {
    /// Legal and every dependence satisfied.
    pub fn is_complete(&self) -> bool {
        self.violation.is_none() && self.levels.iter().all(Option::is_some)
    }
}

/// Replay `n_rows` rows against every dependence. `ends[k]` gives the
/// statement positions of `relations[k]`.
pub fn replay(
    relations: &[&DependenceRelation],
    ends: &[(usize, usize)],
    rows: &[&[AffineExpr]],
    n_rows: usize,
) -> PolyResult<Replay> {
    let mut out = Replay {
        levels: vec![None; relations.len()],
        carried: vec![false; n_rows],
        violation: None,
    };
    for (k, (relation, &(src, tgt))) in relations.iter().zip(ends).enumerate() {
        let mut state = DepState::new(src, tgt, relation);
        if operations::is_integer_empty(&state.residual)? {
            out.levels[k] = Some(0);
            continue;
        }
        for r in 0..n_rows {
            let diff = relation.difference(&rows[src][r], &rows[tgt][r]);
            match state.advance(r, &diff)? {
                RowEffect::Violated => {
                    out.violation.get_or_insert((k, r));
                    break;
                }
                RowEffect::Carried => out.carried[r] = true,
                RowEffect::Weak => {}
                RowEffect::Done => break,
            }
        }
        out.levels[k] = state.satisfied_at;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Dependence;
    use crate::analysis::DependenceKind;
    use crate::ir::pir::StmtId;

    /// Uniform self dependence of a 2-d statement on a 0..=9 box.
    fn stencil(dist: &[i64]) -> DependenceRelation {
        let dep = Dependence::uniform(StmtId(0), StmtId(0), DependenceKind::Flow, dist, 0);
        let mut rel = dep.relation;
        for k in 0..4 {
            rel.pairs.constraints.add(Constraint::lower_bound(k, 0, 4, 0));
            rel.pairs.constraints.add(Constraint::upper_bound(k, 9, 4, 0));
        }
        rel
    }

    fn row(r: &[i64]) -> AffineExpr {
        AffineExpr::from_row(r, 2, 0)
    }

    #[test]
    fn test_row_effects() {
        let rel = stencil(&[0, 1]);
        let i = row(&[1, 0, 0]);
        let j = row(&[0, 1, 0]);
        let minus_j = row(&[0, -1, 0]);
        let sys = rel.constraints();
        assert_eq!(row_effect(sys, &rel.difference(&i, &i)).unwrap(), RowEffect::Weak);
        assert_eq!(row_effect(sys, &rel.difference(&j, &j)).unwrap(), RowEffect::Carried);
        assert_eq!(row_effect(sys, &rel.difference(&minus_j, &minus_j)).unwrap(), RowEffect::Violated);
    }

    #[test]
    fn test_advance_satisfies_at_carrying_row() {
        let rel = stencil(&[1, 0]);
        let mut state = DepState::new(0, 0, &rel);
        let j = row(&[0, 1, 0]);
        let i = row(&[1, 0, 0]);
        assert_eq!(state.advance(0, &rel.difference(&j, &j)).unwrap(), RowEffect::Weak);
        assert!(!state.is_satisfied());
        assert_eq!(state.advance(1, &rel.difference(&i, &i)).unwrap(), RowEffect::Carried);
        assert_eq!(state.satisfied_at, Some(1));
        assert_eq!(state.advance(2, &rel.difference(&j, &j)).unwrap(), RowEffect::Done);
    }

    #[test]
    fn test_replay_wavefront() {
        // (1, 0) and (0, 1) under [i + j, j]: both carried by the first row
        let a = stencil(&[1, 0]);
        let b = stencil(&[0, 1]);
        let rows = vec![row(&[1, 1, 0]), row(&[0, 1, 0])];
        let out = replay(&[&a, &b], &[(0, 0), (0, 0)], &[&rows], 2).unwrap();
        assert_eq!(out.levels, vec![Some(0), Some(0)]);
        assert_eq!(out.carried, vec![true, false]);
        assert!(out.is_complete());
    }

    #[test]
    fn test_replay_reports_violation() {
        let a = stencil(&[1, -1]);
        let rows = vec![row(&[0, 1, 0]), row(&[1, 0, 0])];
        let out = replay(&[&a], &[(0, 0)], &[&rows], 2).unwrap();
        assert_eq!(out.violation, Some((0, 0)));
        assert!(!out.is_complete());
    }

    #[test]
    fn test_residual_before_drops_ordered_pairs() {
        let rel = stencil(&[1, 0]);
        let rows = vec![row(&[1, 0, 0])];
        let residual = residual_before(&rel, &rows, &rows, 1);
        assert!(operations::is_integer_empty(&residual).unwrap());
        let untouched = residual_before(&rel, &rows, &rows, 0);
        assert!(!operations::is_integer_empty(&untouched).unwrap());
    }
}
