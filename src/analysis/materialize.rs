//! Dependence materialization.
//!
//! Runs once before scheduling: checks every dependence against the
//! program, drops read-after-read edges unless requested, clips each
//! polyhedron to the statement domains and the parameter context, drops
//! empty edges, and optionally removes redundant ones.

use crate::analysis::dependence::{Dependence, DependenceKind};
use crate::ir::pir::PolyProgram;
use crate::options::SchedulerOptions;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::expr::narrow;
use crate::polyhedral::operations;
use crate::utils::errors::{InputError, InputErrorKind, PolyResult};
use log::debug;

/// Counters reported by [`materialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub input: usize,
    pub dropped_rar: usize,
    pub dropped_empty: usize,
    pub coalesced: usize,
    pub transitively_reduced: usize,
}

/// Reject dependences that do not fit the program.
pub fn validate_dependences(program: &PolyProgram, deps: &[Dependence]) -> PolyResult<()> {
    for dep in deps {
        let (src, tgt) = match (program.get_stmt(dep.source), program.get_stmt(dep.target)) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                return Err(InputError::new(
                    InputErrorKind::UnknownStatement,
                    format!("dependence {} -> {} names an unknown statement", dep.source, dep.target),
                )
                .into())
            }
        };
        let rel = &dep.relation;
        if rel.src_dim != src.depth()
            || rel.tgt_dim != tgt.depth()
            || rel.pairs.dim() != rel.n_dim()
        {
            return Err(InputError::new(
                InputErrorKind::DimensionMismatch,
                format!(
                    "dependence {} -> {} is over {}+{} dimensions, statements have {}+{}",
                    dep.source, dep.target, rel.src_dim, rel.tgt_dim, src.depth(), tgt.depth()
                ),
            )
            .into());
        }
        if rel.n_param != program.n_param() || rel.pairs.n_param() != program.n_param() {
            return Err(InputError::new(
                InputErrorKind::ParameterMismatch,
                format!("dependence {} -> {} has {} parameters, program declares {}",
                    dep.source, dep.target, rel.n_param, program.n_param()),
            )
            .into());
        }
    }
    Ok(())
}

/// Produce the dependence list the scheduler works on.
pub fn materialize(
    program: &PolyProgram,
    deps: &[Dependence],
    options: &SchedulerOptions,
) -> PolyResult<(Vec<Dependence>, MaterializeStats)> {
    validate_dependences(program, deps)?;
    let mut stats = MaterializeStats { input: deps.len(), ..Default::default() };

    let mut clipped = Vec::with_capacity(deps.len());
    for dep in deps {
        if dep.kind == DependenceKind::Input && !options.rar {
            stats.dropped_rar += 1;
            continue;
        }
        let dep = clip_to_domains(program, dep)?;
        if dep.relation.is_empty()? {
            stats.dropped_empty += 1;
            continue;
        }
        clipped.push(dep);
    }

    if options.last_writer {
        let before = clipped.len();
        clipped = transitive_reduction(clipped)?;
        stats.transitively_reduced = before - clipped.len();
    }

    if options.coalesce {
        let before = clipped.len();
        clipped = coalesce(clipped)?;
        stats.coalesced = before - clipped.len();
    }

    debug!(
        "materialized {} of {} dependences (rar {}, empty {}, reduced {}, coalesced {})",
        clipped.len(), stats.input, stats.dropped_rar, stats.dropped_empty,
        stats.transitively_reduced, stats.coalesced
    );
    Ok((clipped, stats))
}

/// Intersect a dependence polyhedron with both domains and the context.
fn clip_to_domains(program: &PolyProgram, dep: &Dependence) -> PolyResult<Dependence> {
    let mut out = dep.clone();
    // validate_dependences has already resolved both ends
    let src = program.get_stmt(dep.source).map(|s| program.domain_in_context(s));
    let tgt = program.get_stmt(dep.target).map(|s| program.domain_in_context(s));
    let (src, tgt) = match (src, tgt) {
        (Some(s), Some(t)) => (s, t),
        _ => return Err(InputError::new(InputErrorKind::UnknownStatement, dep.description()).into()),
    };
    let rel = &dep.relation;
    let mut sys = rel.constraints().clone();
    sys.add_all(rel.lift_source_constraints(&src.constraints).constraints);
    sys.add_all(rel.lift_target_constraints(&tgt.constraints).constraints);
    sys.simplify();
    out.relation.pairs.constraints = sys;
    Ok(out)
}

/// Drop every dependence whose pairs are contained in another dependence
/// between the same statements.
fn coalesce(deps: Vec<Dependence>) -> PolyResult<Vec<Dependence>> {
    let mut kept: Vec<Dependence> = Vec::with_capacity(deps.len());
    'next: for dep in deps {
        for other in &kept {
            if other.source == dep.source
                && other.target == dep.target
                && operations::is_subset(dep.relation.constraints(), other.relation.constraints())?
            {
                continue 'next;
            }
        }
        let mut i = 0;
        while i < kept.len() {
            let other = &kept[i];
            if other.source == dep.source
                && other.target == dep.target
                && operations::is_subset(other.relation.constraints(), dep.relation.constraints())?
            {
                kept.remove(i);
            } else {
                i += 1;
            }
        }
        kept.push(dep);
    }
    Ok(kept)
}

fn is_lex_positive(v: &[i64]) -> bool {
    v.iter().find(|&&x| x != 0).map_or(false, |&x| x > 0)
}

/// Remove uniform flow dependences `S -> T` at distance `d` whose every pair
/// is ordered through a self dependence `S -> S` at distance `e` followed by
/// a dependence `S -> T` at distance `d - e`. Later writes to the same cell
/// kill the earlier ones, so only the last writer needs to be ordered.
fn transitive_reduction(deps: Vec<Dependence>) -> PolyResult<Vec<Dependence>> {
    let mut removed = vec![false; deps.len()];
    for i in 0..deps.len() {
        let dep = &deps[i];
        let d = match (&dep.distance, dep.kind) {
            (Some(d), DependenceKind::Flow) => d,
            _ => continue,
        };
        'witness: for (j, first) in deps.iter().enumerate() {
            if j == i || removed[j] || !first.is_self() || first.source != dep.source {
                continue;
            }
            let e = match &first.distance {
                Some(e) if e.len() == d.len() && is_lex_positive(e) => e,
                _ => continue,
            };
            let rest: Vec<i64> = d.iter().zip(e).map(|(a, b)| a - b).collect();
            for (k, second) in deps.iter().enumerate() {
                if k == i || k == j || removed[k] || second.source != dep.source || second.target != dep.target {
                    continue;
                }
                if second.distance.as_deref() != Some(rest.as_slice()) {
                    continue;
                }
                if rest.iter().all(|&x| x == 0) && dep.is_self() {
                    continue;
                }
                if chain_covers(dep, first, second, e)? {
                    debug!("{} is implied by {} and {}", dep.description(), first.description(), second.description());
                    removed[i] = true;
                    break 'witness;
                }
            }
        }
    }
    Ok(deps.into_iter().zip(removed).filter(|(_, r)| !r).map(|(d, _)| d).collect())
}

/// Every pair `(s, t)` of `dep` has `(s, s + e)` in `first` and
/// `(s + e, t)` in `second`.
fn chain_covers(dep: &Dependence, first: &Dependence, second: &Dependence, e: &[i64]) -> PolyResult<bool> {
    let d = dep.relation.src_dim;
    // first is over [s, t'] with t' = s + e
    let first_map: Vec<(usize, i64)> = (0..d).map(|k| (k, 0)).chain((0..d).map(|k| (k, e[k]))).collect();
    // second is over [s'', t] with s'' = s + e
    let second_map: Vec<(usize, i64)> = (0..d).map(|k| (k, e[k])).chain((0..d).map(|k| (d + k, 0))).collect();
    let mut chain = substitute(first.relation.constraints(), &first_map)?;
    chain.add_all(substitute(second.relation.constraints(), &second_map)?.constraints);
    operations::is_subset(dep.relation.constraints(), &chain)
}

/// Re-express a system where old dimension `j` equals new dimension
/// `map[j].0` plus the constant `map[j].1`.
fn substitute(sys: &ConstraintSystem, map: &[(usize, i64)]) -> PolyResult<ConstraintSystem> {
    let mut out = ConstraintSystem::new(sys.n_dim, sys.n_param);
    for c in &sys.constraints {
        let mut expr = c.expr.clone();
        let mut constant = c.expr.constant as i128;
        expr.coeffs.iter_mut().for_each(|x| *x = 0);
        for (j, &(to, offset)) in map.iter().enumerate() {
            let a = c.expr.coeff(j);
            expr.coeffs[to] = narrow(expr.coeffs[to] as i128 + a as i128, "substitution")?;
            constant += a as i128 * offset as i128;
        }
        expr.constant = narrow(constant, "substitution")?;
        out.add(Constraint::new(expr, c.kind));
    }
    Ok(out)
}
