//! In-memory table sink
//!
//! Reference implementation of the sink contract. A load job is atomic:
//! every row is validated against the schema first and nothing is written
//! when any row fails.

use super::{evolve_schema, SinkError, TableSink};
use crate::schema::{FieldMode, FieldSchema, FieldType, TableSchema};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sluice_shared::utils::time::{format_ts, from_epoch_secs, is_date, is_time, is_timestamp};
use std::sync::RwLock;

/// A stored row.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone)]
struct TableState {
    schema: TableSchema,
    rows: Vec<Row>,
}

/// Thread-safe in-memory table. Starts out missing unless created with
/// [`InMemoryTable::with_schema`].
#[derive(Debug)]
pub struct InMemoryTable {
    name: String,
    state: RwLock<Option<TableState>>,
}

impl InMemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(None),
        }
    }

    /// An existing, empty table with the given columns.
    pub fn with_schema(name: impl Into<String>, schema: TableSchema) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(Some(TableState {
                schema,
                rows: Vec::new(),
            })),
        }
    }

    /// Snapshot of all rows.
    pub fn rows(&self) -> Vec<Row> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn exists(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }

    fn lock_error(&self) -> SinkError {
        SinkError::Backend(anyhow::anyhow!("table {} lock poisoned", self.name))
    }
}

#[async_trait]
impl TableSink for InMemoryTable {
    async fn delete_where(&self, project: &str, metric: &str) -> Result<u64, SinkError> {
        let mut state = self.state.write().map_err(|_| self.lock_error())?;
        let table = state
            .as_mut()
            .ok_or_else(|| SinkError::TableNotFound(self.name.clone()))?;

        let before = table.rows.len();
        table.rows.retain(|row| {
            !(row.get("scanned_project").and_then(Value::as_str) == Some(project)
                && row.get("scanned_metric").and_then(Value::as_str) == Some(metric))
        });
        Ok((before - table.rows.len()) as u64)
    }

    async fn load(&self, payload: &[u8], schema: &TableSchema) -> Result<u64, SinkError> {
        let text = std::str::from_utf8(payload).map_err(|e| SinkError::Rejected {
            errors: vec![format!("Payload is not valid UTF-8: {}", e)],
        })?;

        let mut errors = Vec::new();
        let mut rows = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row_no = idx + 1;
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(record)) => match coerce_row(&record, &schema.fields) {
                    Ok(row) => rows.push(row),
                    Err(msgs) => errors.extend(msgs.into_iter().map(|m| format!("Row {}: {}", row_no, m))),
                },
                Ok(_) => errors.push(format!("Row {}: not a JSON object", row_no)),
                Err(e) => errors.push(format!("Row {}: invalid JSON: {}", row_no, e)),
            }
        }
        if !errors.is_empty() {
            return Err(SinkError::Rejected { errors });
        }

        let mut state = self.state.write().map_err(|_| self.lock_error())?;
        let table = state.get_or_insert_with(|| TableState {
            schema: TableSchema::default(),
            rows: Vec::new(),
        });
        let (merged, added) = evolve_schema(&table.schema, schema)?;
        for field in &added {
            tracing::debug!("Adding column {} ({:?}) to {}", field.name, field.field_type, self.name);
        }
        table.schema = merged;

        let count = rows.len() as u64;
        table.rows.extend(rows);
        Ok(count)
    }

    async fn schema(&self) -> Result<Option<TableSchema>, SinkError> {
        let state = self.state.read().map_err(|_| self.lock_error())?;
        Ok(state.as_ref().map(|t| t.schema.clone()))
    }
}

/// Validate and convert one record. Collects every problem in the row.
fn coerce_row(record: &Map<String, Value>, fields: &[FieldSchema]) -> Result<Row, Vec<String>> {
    let mut row = Row::new();
    let mut errors = Vec::new();
    for (key, value) in record {
        let Some(field) = fields.iter().find(|f| &f.name == key) else {
            if value.is_null() {
                continue;
            }
            errors.push(format!("no such field: {}", key));
            continue;
        };
        match coerce_field(field, value) {
            Ok(v) => {
                row.insert(key.clone(), v);
            }
            Err(e) => errors.push(format!("field {}: {}", key, e)),
        }
    }
    if errors.is_empty() {
        Ok(row)
    } else {
        Err(errors)
    }
}

fn coerce_field(field: &FieldSchema, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if field.mode == FieldMode::Repeated {
        let Value::Array(items) = value else {
            return Err("expected an array for REPEATED field".to_string());
        };
        return items
            .iter()
            .map(|item| coerce_scalar(field, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    coerce_scalar(field, value)
}

fn coerce_scalar(field: &FieldSchema, value: &Value) -> Result<Value, String> {
    match (field.field_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (FieldType::String, Value::String(_)) => Ok(value.clone()),
        (FieldType::String, other) => Ok(Value::String(other.to_string())),
        // inference reads "" as null, so typed columns store it as null
        (_, Value::String(s)) if s.is_empty() => Ok(Value::Null),
        (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("cannot convert {:?} to BOOLEAN", s)),
        },
        (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Value::from(i)),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                _ => Err(format!("cannot convert {} to INTEGER", n)),
            },
        },
        (FieldType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("cannot convert {:?} to INTEGER", s)),
        (FieldType::Float, Value::Number(n)) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("cannot convert {} to FLOAT", n)),
        (FieldType::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("cannot convert {:?} to FLOAT", s)),
        (FieldType::Timestamp, Value::String(s)) => {
            if is_timestamp(s) {
                Ok(value.clone())
            } else {
                Err(format!("cannot convert {:?} to TIMESTAMP", s))
            }
        }
        (FieldType::Timestamp, Value::Number(n)) => n
            .as_f64()
            .and_then(from_epoch_secs)
            .map(|ts| Value::String(format_ts(&ts)))
            .ok_or_else(|| format!("cannot convert {} to TIMESTAMP", n)),
        (FieldType::Date, Value::String(s)) if is_date(s) => Ok(value.clone()),
        (FieldType::Time, Value::String(s)) if is_time(s) => Ok(value.clone()),
        (FieldType::Record, Value::Object(map)) => coerce_row(map, &field.fields)
            .map(Value::Object)
            .map_err(|errs| errs.join("; ")),
        (t, v) => Err(format!("cannot convert {} to {:?}", v, t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema {
            fields: vec![
                FieldSchema::nullable("scanned_metric", FieldType::String),
                FieldSchema::nullable("scanned_project", FieldType::String),
                FieldSchema::nullable("ts", FieldType::Timestamp),
                FieldSchema::nullable("value", FieldType::Float),
            ],
        }
    }

    fn payload(rows: &[Value]) -> Vec<u8> {
        rows.iter()
            .map(|r| format!("{}\n", r))
            .collect::<String>()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_load_creates_table_and_coerces() {
        let table = InMemoryTable::new("t");
        assert!(!table.exists());

        let rows = payload(&[json!({
            "scanned_metric": "M1",
            "scanned_project": "P",
            "ts": "2023-11-14 22:13:20",
            "value": "42.5"
        })]);
        let loaded = table.load(&rows, &schema()).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(table.exists());
        assert_eq!(table.rows()[0]["value"], json!(42.5));
    }

    #[tokio::test]
    async fn test_rejected_load_writes_nothing() {
        let table = InMemoryTable::new("t");
        let rows = payload(&[
            json!({"scanned_metric": "M1", "value": "1.0"}),
            json!({"scanned_metric": "M1", "value": "abc"}),
            json!({"scanned_metric": "M1", "unknown": 1}),
        ]);
        let err = table.load(&rows, &schema()).await.unwrap_err();
        match err {
            SinkError::Rejected { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("Row 2"));
                assert!(errors[1].contains("no such field: unknown"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(table.is_empty());
        assert!(!table.exists());
    }

    #[tokio::test]
    async fn test_delete_where() {
        let table = InMemoryTable::with_schema("t", schema());
        let rows = payload(&[
            json!({"scanned_metric": "M1", "scanned_project": "P"}),
            json!({"scanned_metric": "M2", "scanned_project": "P"}),
            json!({"scanned_metric": "M1", "scanned_project": "Q"}),
        ]);
        table.load(&rows, &schema()).await.unwrap();

        assert_eq!(table.delete_where("P", "M1").await.unwrap(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.delete_where("P", "M1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_on_missing_table() {
        let table = InMemoryTable::new("t");
        let err = table.delete_where("P", "M1").await.unwrap_err();
        assert!(matches!(err, SinkError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_retype_rejected_keeps_rows() {
        let table = InMemoryTable::with_schema("t", schema());
        table
            .load(&payload(&[json!({"value": 1.5})]), &schema())
            .await
            .unwrap();

        let retyped = TableSchema {
            fields: vec![FieldSchema::nullable("value", FieldType::String)],
        };
        let err = table
            .load(&payload(&[json!({"value": "x"})]), &retyped)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Schema(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_coerce_scalars() {
        let ts = FieldSchema::nullable("ts", FieldType::Timestamp);
        assert!(coerce_field(&ts, &json!("2023-11-14T22:13:20.5Z")).is_ok());
        assert_eq!(
            coerce_field(&ts, &json!(1_700_000_000)).unwrap(),
            json!("2023-11-14 22:13:20")
        );
        assert!(coerce_field(&ts, &json!("soon")).is_err());

        let int = FieldSchema::nullable("n", FieldType::Integer);
        assert_eq!(coerce_field(&int, &json!("7")).unwrap(), json!(7));
        assert!(coerce_field(&int, &json!(1.5)).is_err());

        let boolean = FieldSchema::nullable("b", FieldType::Boolean);
        assert_eq!(coerce_field(&boolean, &json!("TRUE")).unwrap(), json!(true));

        let date = FieldSchema::nullable("d", FieldType::Date);
        assert!(coerce_field(&date, &json!("2023-02-30")).is_err());

        let text = FieldSchema::nullable("s", FieldType::String);
        assert_eq!(coerce_field(&text, &json!(3)).unwrap(), json!("3"));

        let mut tags = FieldSchema::nullable("tags", FieldType::String);
        tags.mode = FieldMode::Repeated;
        assert_eq!(coerce_field(&tags, &json!(["a"])).unwrap(), json!(["a"]));
        assert!(coerce_field(&tags, &json!("a")).is_err());
    }

    #[test]
    fn test_empty_string_is_null_for_typed_columns() {
        for field_type in [
            FieldType::Boolean,
            FieldType::Integer,
            FieldType::Float,
            FieldType::Timestamp,
            FieldType::Date,
            FieldType::Time,
        ] {
            let field = FieldSchema::nullable("label", field_type);
            assert_eq!(coerce_field(&field, &json!("")).unwrap(), Value::Null);
        }

        let text = FieldSchema::nullable("label", FieldType::String);
        assert_eq!(coerce_field(&text, &json!("")).unwrap(), json!(""));
    }
}
