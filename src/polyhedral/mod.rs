//! Polyhedral data structures and operations.
//!
//! - Affine expressions and constraints
//! - Constraint systems with Gaussian / Fourier-Motzkin elimination
//! - Integer sets (polyhedra)
//! - Affine maps (schedules)
//! - Solver-backed operations (emptiness, containment)

pub mod space;
pub mod expr;
pub mod constraint;
pub mod set;
pub mod map;
pub mod operations;

pub use space::Space;
pub use expr::AffineExpr;
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use set::IntegerSet;
pub use map::AffineMap;
