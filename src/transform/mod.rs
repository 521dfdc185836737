//! Schedule construction.
//!
//! - [`farkas`]: legality and bounding constraints on schedule coefficients
//! - [`fusion`]: grouping SCCs into clusters
//! - [`scheduler`]: the round driver
//! - [`satisfaction`]: residual tracking and replay
//! - [`tiling`], [`skewing`]: band tilability and diamond tiling
//! - [`remap`]: iterators as functions of the schedule

pub mod farkas;
pub mod fusion;
pub mod remap;
pub mod satisfaction;
pub mod scheduler;
pub mod skewing;
pub mod tiling;

pub use remap::{Remapping, StmtRemap};
pub use scheduler::{Band, DepSatisfaction, RowKind, Schedule, ScheduleStats, Scheduler, TileKind};

use crate::analysis::Dependence;
use crate::ir::pir::PolyProgram;
use crate::options::SchedulerOptions;
use crate::utils::errors::PolyResult;

/// Schedule a program with the given options.
pub fn schedule(program: &PolyProgram, deps: &[Dependence], options: &SchedulerOptions) -> PolyResult<Schedule> {
    Scheduler::new(options.clone()).schedule(program, deps)
}
