//! Diamond tiling by skewing the first row of a band.
//!
//! A band whose first hyperplane `h1` carries dependences can only start
//! its tiles one after another along `h1` (pipelined start-up). Replacing it
//! with `k * h1 - h2` for the smallest legal `k` gives hyperplanes whose
//! cone strictly contains `h1`, so tiles along a whole face can start
//! concurrently:
//!
//! ```text
//! Jacobi 1-d, band [t, t + i]:
//!   k = 1:  t - (t + i) = -i        violates (1, 1)
//!   k = 2:  2t - (t + i) = t - i    legal   -> [t - i, t + i]
//! ```
//!
//! `h1 = (h1' + h2) / k` is a positive combination of the new rows, which
//! is the concurrent start-up certificate.

use crate::ir::pir::PolyStmt;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::operations;
use crate::transform::satisfaction::{residual_before, row_effect, RowEffect};
use crate::transform::tiling::{Band, DepEnds};
use crate::utils::errors::PolyResult;
use log::debug;

/// `k * h1 - h2`, or `k * h1 - (h2 + ... + hn)` when `full` is set.
fn skewed_row(stmt: &PolyStmt, band: &Band, k: i64, full: bool) -> PolyResult<AffineExpr> {
    let rows = &stmt.schedule.outputs;
    let h1 = &rows[band.start];
    let last = if full { band.start + band.width } else { band.start + 2 };
    let mut out = h1.scale(k)?;
    for row in &rows[band.start + 1..last] {
        out = out.combine(1, row, -1)?;
    }
    Ok(out)
}

/// Apply the diamond skew to the band if some `k <= coeff_bound` is legal,
/// returning `k`. Statement rows are only touched on success.
pub fn diamond_skew(
    band: &Band,
    stmts: &mut [PolyStmt],
    deps: &[DepEnds<'_>],
    coeff_bound: i64,
    full: bool,
) -> PolyResult<Option<i64>> {
    if band.width < 2 {
        return Ok(None);
    }
    let mut open = Vec::with_capacity(deps.len());
    for dep in deps {
        let src_rows = &stmts[dep.src].schedule.outputs;
        let tgt_rows = &stmts[dep.tgt].schedule.outputs;
        let residual = residual_before(dep.relation, src_rows, tgt_rows, band.start);
        if !operations::is_integer_empty(&residual)? {
            open.push((dep, residual));
        }
    }

    let mut pipelined = false;
    for (dep, residual) in &open {
        let h1_src = &stmts[dep.src].schedule.outputs[band.start];
        let h1_tgt = &stmts[dep.tgt].schedule.outputs[band.start];
        if row_effect(residual, &dep.relation.difference(h1_src, h1_tgt))? == RowEffect::Carried {
            pipelined = true;
            break;
        }
    }
    if !pipelined {
        return Ok(None);
    }

    'search: for k in 1..=coeff_bound {
        let candidates = stmts
            .iter()
            .map(|s| skewed_row(s, band, k, full))
            .collect::<PolyResult<Vec<_>>>()?;
        for (dep, residual) in &open {
            let diff = dep.relation.difference(&candidates[dep.src], &candidates[dep.tgt]);
            if !operations::always_at_least(residual, &diff, 0)? {
                continue 'search;
            }
        }
        for (stmt, row) in stmts.iter_mut().zip(candidates) {
            stmt.schedule.set_row(band.start, row);
        }
        debug!("diamond skew of band at row {} with k = {}", band.start, k);
        return Ok(Some(k));
    }
    Ok(None)
}
