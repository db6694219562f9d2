//! HTTP route handlers.

pub mod bitstreams;
pub mod health;
pub mod usage;
