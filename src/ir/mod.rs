//! Intermediate representation consumed by the scheduler.
//!
//! The PIR holds statements in polyhedral form: iteration domains, the
//! parameter context and the schedule rows built so far.

pub mod pir;

pub use pir::*;
