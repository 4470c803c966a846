//! Table loader

use crate::audit;
use crate::metrics;
use crate::schema::TableSchema;
use crate::sink::{SinkError, TableSink};
use crate::stage::StagedBatch;
use sluice_shared::types::outcome::LoadOutcome;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub outcome: LoadOutcome,
    pub rows: u64,
}

/// Append the staged batch under `schema`. Never raises: every sink error
/// maps to [`LoadOutcome::Failed`] after its messages are logged.
pub async fn load_batch(
    sink: &dyn TableSink,
    batch: &StagedBatch,
    schema: &TableSchema,
    destination: &str,
    project: &str,
) -> LoadResult {
    for column in new_columns(sink, schema).await {
        info!("Column {} is new to {}", column, destination);
    }

    let result = match batch.bytes() {
        Ok(payload) => sink.load(&payload, schema).await,
        Err(e) => Err(SinkError::Backend(e)),
    };

    match result {
        Ok(rows) => {
            info!("Loaded {} rows into {} for {}.", rows, destination, project);
            audit::batch_loaded(destination, project, rows);
            metrics::LOAD_TOTAL
                .with_label_values(&[LoadOutcome::Success.code()])
                .inc();
            metrics::LOAD_ROWS.inc_by(rows as f64);
            LoadResult {
                outcome: LoadOutcome::Success,
                rows,
            }
        }
        Err(e) => {
            let messages = e.messages();
            for message in &messages {
                error!("{}", message);
            }
            if matches!(e, SinkError::Rejected { .. }) {
                audit::batch_rejected(destination, project, messages.len());
            }
            metrics::LOAD_TOTAL
                .with_label_values(&[LoadOutcome::Failed.code()])
                .inc();
            LoadResult {
                outcome: LoadOutcome::Failed,
                rows: 0,
            }
        }
    }
}

/// Top-level columns of `schema` the table does not have yet. Empty when
/// the table is missing or its schema cannot be read.
async fn new_columns(sink: &dyn TableSink, schema: &TableSchema) -> Vec<String> {
    match sink.schema().await {
        Ok(Some(existing)) => schema
            .names()
            .filter(|name| !existing.names().any(|n| n == *name))
            .map(str::to_string)
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!("Could not read current table schema: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, FieldType};
    use crate::sink::InMemoryTable;
    use chrono::DateTime;
    use serde_json::json;
    use sluice_shared::types::sample::Sample;
    use std::collections::BTreeMap;

    fn batch(values: &[serde_json::Value]) -> StagedBatch {
        let samples: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample {
                query: "up".to_string(),
                scanned_metric: "M1".to_string(),
                ts: DateTime::from_timestamp(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                value: v.clone(),
                scanned_project: String::new(),
                labels: BTreeMap::new(),
            })
            .collect();
        StagedBatch::materialize(&samples, "P", None).unwrap()
    }

    fn schema(value_type: FieldType) -> TableSchema {
        TableSchema {
            fields: vec![
                FieldSchema::nullable("query", FieldType::String),
                FieldSchema::nullable("scanned_metric", FieldType::String),
                FieldSchema::nullable("scanned_project", FieldType::String),
                FieldSchema::nullable("ts", FieldType::Timestamp),
                FieldSchema::nullable("value", value_type),
            ],
        }
    }

    #[tokio::test]
    async fn test_successful_load() {
        let table = InMemoryTable::new("t");
        let result = load_batch(&table, &batch(&[json!("1.5"), json!("2")]), &schema(FieldType::Float), "d:t", "P").await;
        assert_eq!(result.outcome, LoadOutcome::Success);
        assert_eq!(result.rows, 2);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_maps_to_failed() {
        let table = InMemoryTable::new("t");
        let result = load_batch(&table, &batch(&[json!("not a number")]), &schema(FieldType::Float), "d:t", "P").await;
        assert_eq!(result.outcome, LoadOutcome::Failed);
        assert_eq!(result.rows, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_loads_zero_rows() {
        let table = InMemoryTable::new("t");
        let result = load_batch(&table, &batch(&[]), &schema(FieldType::Float), "d:t", "P").await;
        assert_eq!(result.outcome, LoadOutcome::Success);
        assert_eq!(result.rows, 0);
    }

    #[tokio::test]
    async fn test_new_columns_against_existing_table() {
        let table = InMemoryTable::new("t");
        assert!(new_columns(&table, &schema(FieldType::Float)).await.is_empty());

        load_batch(&table, &batch(&[json!("1")]), &schema(FieldType::Float), "d:t", "P").await;
        let mut wider = schema(FieldType::Float);
        wider.fields.push(FieldSchema::nullable("zone", FieldType::String));
        assert_eq!(new_columns(&table, &wider).await, vec!["zone".to_string()]);
        assert!(new_columns(&table, &schema(FieldType::Float)).await.is_empty());
    }
}
