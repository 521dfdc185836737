//! Tiling legality of bands.
//!
//! A band of consecutive hyperplanes can be tiled rectangularly when every
//! row of the band is non-negative on every dependence still open at the
//! start of the band:
//!
//! ```text
//! for t = 0 to T:              for tt = 0 to T step 32:
//!   for i = 1 to N:      =>      for ii = ... step 32:
//!     A[t][i] = ...                for t = tt to min(tt + 31, T):
//!                                    for i = ...
//! ```
//!
//! Tiling itself is left to the code generator; this pass only records the
//! band, its kind and the tile sizes. When a forced tiling range is set,
//! bands are first split at its edges and only the rows inside it are
//! considered.

use crate::analysis::DependenceRelation;
use crate::ir::pir::PolyStmt;
use crate::options::{SchedulerOptions, L2_TILE_RATIO};
use crate::polyhedral::operations;
use crate::transform::satisfaction::residual_before;
use crate::transform::skewing;
use crate::utils::errors::{PolyResult, PolySchedError};
use log::debug;
use serde::{Serialize, Deserialize};
use std::ops::Range;

/// How a band may be tiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Not verified or not permutable
    None,
    /// Rectangular tiles
    Rectangular,
    /// Diamond tiles with concurrent start-up
    Diamond,
}

/// A run of consecutive hyperplane rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// First row
    pub start: usize,
    /// Number of rows
    pub width: usize,
    pub tiling: TileKind,
    /// One size per row when tilable
    pub tile_sizes: Vec<i64>,
    /// Second-level sizes, empty unless requested
    #[serde(default)]
    pub l2_tile_sizes: Vec<i64>,
    /// `k` of the diamond skew `k * h1 - h2`
    pub diamond_factor: Option<i64>,
}

impl Band {
    pub fn new(start: usize, width: usize) -> Self {
        Self {
            start,
            width,
            tiling: TileKind::None,
            tile_sizes: Vec::new(),
            l2_tile_sizes: Vec::new(),
            diamond_factor: None,
        }
    }

    pub fn rows(&self) -> Range<usize> {
        self.start..self.start + self.width
    }

    pub fn is_tilable(&self) -> bool {
        self.tiling != TileKind::None
    }
}

/// Dependences in statement-position form.
#[derive(Debug, Clone, Copy)]
pub struct DepEnds<'a> {
    pub relation: &'a DependenceRelation,
    pub src: usize,
    pub tgt: usize,
}

/// Every row of the band weakly satisfies every dependence open at its
/// start.
pub fn is_permutable(band: &Band, stmts: &[PolyStmt], deps: &[DepEnds<'_>]) -> PolyResult<bool> {
    for dep in deps {
        let src_rows = &stmts[dep.src].schedule.outputs;
        let tgt_rows = &stmts[dep.tgt].schedule.outputs;
        let residual = residual_before(dep.relation, src_rows, tgt_rows, band.start);
        if operations::is_integer_empty(&residual)? {
            continue;
        }
        for r in band.rows() {
            let diff = dep.relation.difference(&src_rows[r], &tgt_rows[r]);
            if !operations::always_at_least(&residual, &diff, 0)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Split bands wherever the forced tiling range starts or ends.
fn split_at_tile_depths(bands: &[Band], options: &SchedulerOptions) -> Vec<Band> {
    let mut out = Vec::with_capacity(bands.len());
    for band in bands {
        let mut start = band.start;
        for r in band.rows().skip(1) {
            if options.tiles_row(r) != options.tiles_row(r - 1) {
                out.push(Band::new(start, r - start));
                start = r;
            }
        }
        out.push(Band::new(start, band.start + band.width - start));
    }
    out
}

/// Mark tilable bands, applying the diamond skew when requested.
pub fn tile_bands(
    bands: &mut Vec<Band>,
    stmts: &mut [PolyStmt],
    deps: &[DepEnds<'_>],
    options: &SchedulerOptions,
) -> PolyResult<()> {
    if options.first_tile_depth.is_some() || options.last_tile_depth.is_some() {
        *bands = split_at_tile_depths(bands, options);
    }
    for band in bands.iter_mut() {
        if !band.rows().all(|r| options.tiles_row(r)) {
            debug!("band {:?} is outside the tiled rows", band.rows());
            continue;
        }
        if !is_permutable(band, stmts, deps)? {
            debug!("band {:?} is not permutable", band.rows());
            continue;
        }
        band.tiling = TileKind::Rectangular;
        band.tile_sizes = vec![options.tile_size; band.width];
        if options.l2_tile {
            let l2 = options
                .tile_size
                .checked_mul(L2_TILE_RATIO)
                .ok_or_else(|| PolySchedError::overflow("second-level tile size"))?;
            band.l2_tile_sizes = vec![l2; band.width];
        }

        if options.diamond_tile && band.width >= 2 {
            if let Some(k) = skewing::diamond_skew(band, stmts, deps, options.coeff_bound, options.full_diamond_tile)? {
                band.tiling = TileKind::Diamond;
                band.diamond_factor = Some(k);
            }
        }
        debug!("band {:?}: {:?}", band.rows(), band.tiling);
    }
    Ok(())
}
