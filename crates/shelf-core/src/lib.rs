//! shelf-core: shared types, IDs, errors, configuration, and the format
//! registry.
//!
//! This crate is the foundational dependency for the other shelf-* crates,
//! providing type-safe identifiers, a unified error type, application
//! configuration, and the bitstream-format registry used for MIME lookups
//! and default display names.

pub mod config;
pub mod error;
pub mod format;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
