//! Data model for the export pipeline

pub mod metric;
pub mod outcome;
pub mod sample;
