//! Destination table backends
//!
//! A sink is an opaque warehouse table with three operations: delete rows
//! for one (project, metric) pair, append a line-delimited JSON batch under
//! an explicit schema, and report its current columns. Loads use additive
//! evolution only: new nullable columns may appear, existing columns keep
//! their type and mode.

#[cfg(feature = "clickhouse-storage")]
pub mod clickhouse;
pub mod memory;

use crate::config::{DestinationConfig, StorageConfig};
use crate::schema::{FieldSchema, TableSchema};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::InMemoryTable;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink refused the batch; one message per offending row or column.
    #[error("load rejected with {} error(s)", .errors.len())]
    Rejected { errors: Vec<String> },

    /// The incoming schema would remove or retype an existing column.
    #[error("schema conflict: {0}")]
    Schema(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl SinkError {
    /// Row-level messages carried by the error, if any.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Rejected { errors } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Warehouse table used as the pipeline destination.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Delete every row with the given `scanned_project` and `scanned_metric`.
    /// Returns the number of rows removed when the backend reports it.
    async fn delete_where(&self, project: &str, metric: &str) -> Result<u64, SinkError>;

    /// Append line-delimited JSON rows under `schema`, creating the table
    /// when missing. Returns the number of rows written.
    async fn load(&self, payload: &[u8], schema: &TableSchema) -> Result<u64, SinkError>;

    /// Current table schema, `None` when the table does not exist yet.
    async fn schema(&self) -> Result<Option<TableSchema>, SinkError>;
}

/// Merge `incoming` into `existing` under additive-only rules.
///
/// Returns the merged schema and the top-level columns that are new.
/// Existing columns absent from `incoming` are kept untouched.
pub fn evolve_schema(
    existing: &TableSchema,
    incoming: &TableSchema,
) -> Result<(TableSchema, Vec<FieldSchema>), SinkError> {
    let mut merged = existing.fields.clone();
    let mut added = Vec::new();
    merge_fields(&mut merged, &incoming.fields, "", &mut added)?;
    Ok((TableSchema { fields: merged }, added))
}

fn merge_fields(
    current: &mut Vec<FieldSchema>,
    incoming: &[FieldSchema],
    prefix: &str,
    added: &mut Vec<FieldSchema>,
) -> Result<(), SinkError> {
    for field in incoming {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match current.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => {
                if existing.field_type != field.field_type {
                    return Err(SinkError::Schema(format!(
                        "Field {} has changed type from {:?} to {:?}",
                        path, existing.field_type, field.field_type
                    )));
                }
                if existing.mode != field.mode {
                    return Err(SinkError::Schema(format!(
                        "Field {} has changed mode from {:?} to {:?}",
                        path, existing.mode, field.mode
                    )));
                }
                if !field.fields.is_empty() {
                    let mut nested_added = Vec::new();
                    merge_fields(&mut existing.fields, &field.fields, &path, &mut nested_added)?;
                }
            }
            None => {
                current.push(field.clone());
                if prefix.is_empty() {
                    added.push(field.clone());
                }
            }
        }
    }
    Ok(())
}

/// Build the sink selected by the storage configuration.
pub async fn connect(
    storage: &StorageConfig,
    destination: &DestinationConfig,
) -> Result<Arc<dyn TableSink>> {
    match storage {
        StorageConfig::InMemory => {
            tracing::warn!(
                "In-memory storage selected: rows for {} are discarded at exit",
                destination.qualified()
            );
            Ok(Arc::new(InMemoryTable::new(destination.qualified())))
        }
        #[cfg(feature = "clickhouse-storage")]
        StorageConfig::ClickHouse { endpoint, .. } => {
            let database = storage.database(destination).unwrap_or(&destination.dataset);
            let table = self::clickhouse::ClickHouseTable::new(endpoint, database, &destination.table)?;
            tracing::info!("ClickHouse storage enabled: {} / {}", endpoint, database);
            Ok(Arc::new(table))
        }
        #[cfg(not(feature = "clickhouse-storage"))]
        StorageConfig::ClickHouse { .. } => {
            anyhow::bail!("ClickHouse storage requires the clickhouse-storage feature")
        }
    }
}
