//! Shared types and utilities for Sluice
//!
//! This crate contains the data model that flows through the export
//! pipeline (metric definitions, samples, load outcomes) and the timestamp
//! helpers used by the exporter and the CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{metric::*, outcome::*, sample::*};
