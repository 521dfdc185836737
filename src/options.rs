//! Scheduler options.
//!
//! A plain data contract: every field has a documented default, presets
//! cover the common fusion choices, and chained setters adjust the rest.

use crate::utils::errors::{InputError, InputErrorKind, PolyResult};
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How strongly connected components are grouped into fusion clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FusionPolicy {
    /// Every SCC is its own cluster.
    NoFuse,
    /// All SCCs form one cluster.
    MaxFuse,
    /// Contiguous SCCs of equal loop depth are fused unless the fused cluster
    /// would lose a parallel hyperplane that both sides have on their own.
    #[default]
    SmartFuse,
    /// Smart fusion that also keeps parallel SCCs apart from sequential ones.
    TypedFuse,
    /// Typed fusion for the outermost hyperplane, max fusion below it.
    HybridFuse,
}

impl fmt::Display for FusionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FusionPolicy::NoFuse => "nofuse",
            FusionPolicy::MaxFuse => "maxfuse",
            FusionPolicy::SmartFuse => "smartfuse",
            FusionPolicy::TypedFuse => "typedfuse",
            FusionPolicy::HybridFuse => "hybridfuse",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FusionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "nofuse" => Ok(FusionPolicy::NoFuse),
            "maxfuse" => Ok(FusionPolicy::MaxFuse),
            "smartfuse" => Ok(FusionPolicy::SmartFuse),
            "typedfuse" => Ok(FusionPolicy::TypedFuse),
            "hybridfuse" => Ok(FusionPolicy::HybridFuse),
            other => Err(format!("unknown fusion policy '{}'", other)),
        }
    }
}

/// Solver backend used for the hyperplane search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Exact rational simplex with branch-and-bound.
    #[default]
    Exact,
    /// LP relaxation, scaled to integers.
    Lp,
    /// GLPK (not linked into this build).
    Glpk,
    /// Gurobi (not linked into this build).
    Gurobi,
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverKind::Exact => "exact",
            SolverKind::Lp => "lp",
            SolverKind::Glpk => "glpk",
            SolverKind::Gurobi => "gurobi",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" | "pip" | "isl" => Ok(SolverKind::Exact),
            "lp" | "clp" => Ok(SolverKind::Lp),
            "glpk" => Ok(SolverKind::Glpk),
            "gurobi" => Ok(SolverKind::Gurobi),
            other => Err(format!("unknown solver '{}'", other)),
        }
    }
}

/// Where scalar cut rows separate the clusters of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CutStrategy {
    /// Every cluster gets its own value.
    #[default]
    Eager,
    /// Only clusters of different loop depth are separated while that
    /// still separates something; same-depth clusters wait for a later cut.
    Delayed,
}

impl fmt::Display for CutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CutStrategy::Eager => "eager",
            CutStrategy::Delayed => "delayed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CutStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eager" | "all" => Ok(CutStrategy::Eager),
            "delayed" | "delayed-cut" | "dim" => Ok(CutStrategy::Delayed),
            other => Err(format!("unknown cut strategy '{}'", other)),
        }
    }
}

/// Ratio of second-level to first-level tile sizes.
pub const L2_TILE_RATIO: i64 = 8;

/// Options controlling one scheduling run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Fusion policy (default: smart fusion)
    pub fuse: FusionPolicy,

    /// Run the tiling-legality pass and mark tilable bands (default: true)
    pub tile: bool,

    /// Tile size recorded for every tilable row (default: 32)
    pub tile_size: i64,

    /// Look for diamond (concurrent start-up) tiling (default: false)
    pub diamond_tile: bool,

    /// Diamond tiling against all rows of the band instead of the second one (default: false)
    pub full_diamond_tile: bool,

    /// Also record second-level tile sizes, `L2_TILE_RATIO` times the first level (default: false)
    pub l2_tile: bool,

    /// First schedule row that may be tiled, 0-based (default: none)
    pub first_tile_depth: Option<usize>,

    /// Last schedule row that may be tiled, 0-based and inclusive (default: none)
    pub last_tile_depth: Option<usize>,

    /// Skip the hyperplane search and keep the original loop order (default: false)
    pub identity: bool,

    /// How cut rows group clusters (default: eager)
    pub cut: CutStrategy,

    /// Detect parallel rows (default: true)
    pub parallel: bool,

    /// Bound on the absolute value of every schedule coefficient (default: 10)
    pub coeff_bound: i64,

    /// Allow negative iterator coefficients (default: false)
    pub allow_negative_coeffs: bool,

    /// Allow parametric shifts (default: true)
    pub allow_param_coeffs: bool,

    /// Keep read-after-read dependences (default: false)
    pub rar: bool,

    /// Reduce uniform dependences to last-writer form (default: false)
    pub last_writer: bool,

    /// Remove duplicate and subsumed dependence polyhedra (default: true)
    pub coalesce: bool,

    /// Drop the dependence-distance bounding function (default: false)
    pub no_dep_bound: bool,

    /// Solver backend (default: exact)
    pub solver: SolverKind,

    /// Maximum number of scheduling rounds (default: 64)
    pub max_rounds: usize,

    /// Wall-clock budget for the whole run (default: none)
    pub time_budget: Option<Duration>,

    /// Solve the clusters of one round on the rayon pool (default: false)
    pub parallel_solve: bool,

    /// Produce the remapping artifact (default: false)
    pub remapping: bool,

    /// Replay the final schedule against every dependence (default: true)
    pub verify: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            fuse: FusionPolicy::SmartFuse,
            tile: true,
            tile_size: 32,
            diamond_tile: false,
            full_diamond_tile: false,
            l2_tile: false,
            first_tile_depth: None,
            last_tile_depth: None,
            identity: false,
            cut: CutStrategy::Eager,
            parallel: true,
            coeff_bound: 10,
            allow_negative_coeffs: false,
            allow_param_coeffs: true,
            rar: false,
            last_writer: false,
            coalesce: true,
            no_dep_bound: false,
            solver: SolverKind::Exact,
            max_rounds: 64,
            time_budget: None,
            parallel_solve: false,
            remapping: false,
            verify: true,
        }
    }
}

impl SchedulerOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximal distribution preset
    pub fn no_fuse() -> Self {
        Self { fuse: FusionPolicy::NoFuse, ..Default::default() }
    }

    /// Maximal fusion preset
    pub fn max_fuse() -> Self {
        Self { fuse: FusionPolicy::MaxFuse, ..Default::default() }
    }

    /// Set the fusion policy
    pub fn fuse(mut self, policy: FusionPolicy) -> Self {
        self.fuse = policy;
        self
    }

    /// Enable/disable the tiling pass
    pub fn tile(mut self, on: bool) -> Self {
        self.tile = on;
        self
    }

    /// Set the recorded tile size
    pub fn tile_size(mut self, size: i64) -> Self {
        self.tile_size = size;
        self
    }

    /// Enable/disable diamond tiling
    pub fn diamond_tile(mut self, on: bool) -> Self {
        self.diamond_tile = on;
        self
    }

    /// Enable/disable full-dimensional diamond tiling
    pub fn full_diamond_tile(mut self, on: bool) -> Self {
        self.full_diamond_tile = on;
        if on {
            self.diamond_tile = true;
        }
        self
    }

    /// Enable/disable second-level tile sizes
    pub fn l2_tile(mut self, on: bool) -> Self {
        self.l2_tile = on;
        self
    }

    /// Restrict tiling to rows `first..=last`
    pub fn tile_depths(mut self, first: Option<usize>, last: Option<usize>) -> Self {
        self.first_tile_depth = first;
        self.last_tile_depth = last;
        self
    }

    /// Keep the original loop order instead of searching hyperplanes
    pub fn identity(mut self, on: bool) -> Self {
        self.identity = on;
        self
    }

    /// Select the cut strategy
    pub fn cut(mut self, strategy: CutStrategy) -> Self {
        self.cut = strategy;
        self
    }

    /// Whether row `row` lies inside the forced tiling range.
    pub fn tiles_row(&self, row: usize) -> bool {
        self.first_tile_depth.map_or(true, |ft| row >= ft) && self.last_tile_depth.map_or(true, |lt| row <= lt)
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> PolyResult<()> {
        let invalid = |message: String| -> PolyResult<()> {
            Err(InputError::new(InputErrorKind::InvalidOption, message).into())
        };
        if self.coeff_bound <= 0 {
            return invalid(format!("coefficient bound must be positive, got {}", self.coeff_bound));
        }
        if self.tile_size <= 0 {
            return invalid(format!("tile size must be positive, got {}", self.tile_size));
        }
        if let (Some(ft), Some(lt)) = (self.first_tile_depth, self.last_tile_depth) {
            if ft > lt {
                return invalid(format!("first tiled row {} is after last tiled row {}", ft, lt));
            }
        }
        Ok(())
    }

    /// Enable/disable parallel row detection
    pub fn parallel(mut self, on: bool) -> Self {
        self.parallel = on;
        self
    }

    /// Set the coefficient bound
    pub fn coeff_bound(mut self, bound: i64) -> Self {
        self.coeff_bound = bound;
        self
    }

    /// Allow negative iterator coefficients
    pub fn negative_coeffs(mut self, on: bool) -> Self {
        self.allow_negative_coeffs = on;
        self
    }

    /// Allow parametric shifts
    pub fn param_coeffs(mut self, on: bool) -> Self {
        self.allow_param_coeffs = on;
        self
    }

    /// Keep read-after-read dependences
    pub fn rar(mut self, on: bool) -> Self {
        self.rar = on;
        self
    }

    /// Enable last-writer reduction
    pub fn last_writer(mut self, on: bool) -> Self {
        self.last_writer = on;
        self
    }

    /// Enable/disable dependence coalescing
    pub fn coalesce(mut self, on: bool) -> Self {
        self.coalesce = on;
        self
    }

    /// Drop the bounding function
    pub fn no_dep_bound(mut self, on: bool) -> Self {
        self.no_dep_bound = on;
        self
    }

    /// Select the solver backend
    pub fn solver(mut self, kind: SolverKind) -> Self {
        self.solver = kind;
        self
    }

    /// Set the round cap
    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Set the wall-clock budget
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Solve clusters in parallel
    pub fn parallel_solve(mut self, on: bool) -> Self {
        self.parallel_solve = on;
        self
    }

    /// Produce the remapping artifact
    pub fn remapping(mut self, on: bool) -> Self {
        self.remapping = on;
        self
    }

    /// Enable/disable the final verification replay
    pub fn verify(mut self, on: bool) -> Self {
        self.verify = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::PolySchedError;

    #[test]
    fn test_defaults() {
        let opts = SchedulerOptions::default();
        assert_eq!(opts.fuse, FusionPolicy::SmartFuse);
        assert_eq!(opts.coeff_bound, 10);
        assert_eq!(opts.solver, SolverKind::Exact);
        assert!(opts.tile && opts.parallel && opts.coalesce && opts.verify);
        assert!(!opts.rar && !opts.last_writer && !opts.diamond_tile);
        assert!(!opts.identity && !opts.l2_tile);
        assert_eq!(opts.cut, CutStrategy::Eager);
        assert_eq!((opts.first_tile_depth, opts.last_tile_depth), (None, None));
    }

    #[test]
    fn test_presets_and_setters() {
        assert_eq!(SchedulerOptions::no_fuse().fuse, FusionPolicy::NoFuse);
        let opts = SchedulerOptions::max_fuse().coeff_bound(4).full_diamond_tile(true);
        assert_eq!(opts.fuse, FusionPolicy::MaxFuse);
        assert_eq!(opts.coeff_bound, 4);
        assert!(opts.diamond_tile);
    }

    #[test]
    fn test_validate_rejects_non_positive_sizes() {
        assert!(SchedulerOptions::default().validate().is_ok());
        for opts in [
            SchedulerOptions::default().coeff_bound(0),
            SchedulerOptions::default().coeff_bound(-3),
            SchedulerOptions::default().tile_size(0),
            SchedulerOptions::default().tile_size(-32),
            SchedulerOptions::default().tile_depths(Some(2), Some(1)),
        ] {
            match opts.validate() {
                Err(PolySchedError::Input(e)) => assert_eq!(e.kind, InputErrorKind::InvalidOption),
                other => panic!("expected an invalid option, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_tile_depth_range() {
        let opts = SchedulerOptions::default().tile_depths(Some(1), Some(2));
        assert!(!opts.tiles_row(0));
        assert!(opts.tiles_row(1) && opts.tiles_row(2));
        assert!(!opts.tiles_row(3));
        assert!(SchedulerOptions::default().tiles_row(7));
        assert!(SchedulerOptions::default().tile_depths(None, Some(0)).tiles_row(0));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Delayed".parse::<CutStrategy>(), Ok(CutStrategy::Delayed));
        assert_eq!(CutStrategy::Eager.to_string(), "eager");
        assert_eq!("smart-fuse".parse::<FusionPolicy>(), Ok(FusionPolicy::SmartFuse));
        assert_eq!("Gurobi".parse::<SolverKind>(), Ok(SolverKind::Gurobi));
        assert!("bogus".parse::<FusionPolicy>().is_err());
        assert_eq!(FusionPolicy::HybridFuse.to_string(), "hybridfuse");
    }
}
