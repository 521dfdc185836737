//! # polysched - Polyhedral Affine Scheduler
//!
//! Computes multidimensional affine schedules for statements given as
//! integer polyhedra, in the style of the Pluto algorithm:
//! - Dependence materialization (RAR, last-writer reduction, coalescing)
//! - Farkas-based legality constraints and bounded hyperplane search
//! - SCC fusion heuristics with split-and-retry
//! - Tiling legality, diamond tiling and parallel-row detection
//!
//! ## Architecture
//!
//! ```text
//! Domains + Dependences → Materialize → Rounds (SCCs → Clusters → Farkas → Solver) → Bands → Schedule
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use polysched::prelude::*;
//!
//! let out = polysched::schedule_str(
//!     "[N] -> { S0[t, i] : 0 <= t < N and 1 <= i < N }",
//!     "[N] -> { S0[t, i] -> S0[t + 1, i'] : i - 1 <= i' <= i + 1 }",
//!     &SchedulerOptions::default(),
//! )?;
//! println!("{}", out.schedules);
//! ```

#![warn(clippy::all)]

pub mod analysis;
pub mod frontend;
pub mod ir;
pub mod options;
pub mod polyhedral;
pub mod solver;
pub mod transform;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{Dependence, DependenceKind, DependenceRelation};
    pub use crate::frontend::{parse_dependences, parse_domains, print_schedule};
    pub use crate::ir::pir::*;
    pub use crate::options::{CutStrategy, FusionPolicy, SchedulerOptions, SolverKind};
    pub use crate::polyhedral::{AffineExpr, AffineMap, Constraint, ConstraintSystem, IntegerSet, Space};
    pub use crate::transform::{Band, Remapping, RowKind, Schedule, Scheduler, TileKind};
    pub use crate::utils::errors::*;
    pub use crate::{schedule, schedule_str, ScheduleOutput};
}

use crate::analysis::Dependence;
use crate::ir::pir::PolyProgram;
use crate::options::SchedulerOptions;
use crate::transform::{Remapping, Schedule};
use crate::utils::errors::PolyResult;

/// Schedule a program. The result is owned by the caller.
pub fn schedule(program: &PolyProgram, deps: &[Dependence], options: &SchedulerOptions) -> PolyResult<Schedule> {
    transform::schedule(program, deps, options)
}

/// Result of [`schedule_str`].
#[derive(Debug, Clone)]
pub struct ScheduleOutput {
    /// Schedules as an isl union map
    pub schedules: String,
    /// Zero-based parallel rows, comma separated
    pub parallel_loops: String,
    /// Present when `options.remapping` is set
    pub remapping: Option<Remapping>,
}

/// Schedule statements given in isl notation.
pub fn schedule_str(domains: &str, dependences: &str, options: &SchedulerOptions) -> PolyResult<ScheduleOutput> {
    let program = frontend::parse_domains(domains)?;
    let deps = frontend::parse_dependences(dependences, &program)?;
    let mut sched = schedule(&program, &deps, options)?;
    Ok(ScheduleOutput {
        schedules: frontend::print_schedule(&sched),
        parallel_loops: frontend::print_parallel_loops(&sched),
        remapping: sched.remapping.take(),
    })
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_schedule_str_remapping() {
        let options = SchedulerOptions::default().remapping(true);
        let out = schedule_str("{ S0[i] : 0 <= i < 4 }", "{ }", &options).unwrap();
        assert_eq!(out.schedules, "{ S0[i] -> [i] }");
        assert_eq!(out.parallel_loops, "0");
        assert!(out.remapping.is_some());
    }
}
