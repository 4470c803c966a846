//! Sluice exporter library
//!
//! Pulls PromQL time series from the monitoring API and replaces the
//! matching partitions of a warehouse table with them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod erase;
pub mod load;
pub mod metrics;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod sink;
pub mod stage;

pub use config::ExporterConfig;
pub use pipeline::{Pipeline, RunReport};
