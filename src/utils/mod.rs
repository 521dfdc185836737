//! Utility modules for the scheduler.
//!
//! - Error types
//! - Exact rational matrices
//! - Source location tracking (text front end)
//! - Name interning (text front end)

pub mod errors;
pub mod matrix;
pub mod location;
pub mod intern;

// Re-exports
pub use errors::*;
pub use location::{SourceLocation, Span};
pub use intern::{Symbol, SymbolInterner};
