//! Dependence model for the scheduler.

pub mod dependence;
pub mod graph;
pub mod materialize;

pub use dependence::{Dependence, DependenceKind, DependenceRelation};
pub use graph::DependenceGraph;
pub use materialize::{materialize, MaterializeStats};
