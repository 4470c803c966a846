//! ClickHouse table sink
//!
//! Maps the inferred schema onto ClickHouse column types (NULLABLE fields
//! become `Nullable(T)`, REPEATED fields `Array(T)`), evolves the table with
//! `ADD COLUMN IF NOT EXISTS`, erases with a synchronous `ALTER TABLE ...
//! DELETE` mutation and inserts the staged batch as `JSONEachRow`.

use super::{evolve_schema, SinkError, TableSink};
use crate::schema::{FieldMode, FieldSchema, FieldType, TableSchema};
use anyhow::Context;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::Deserialize;
use std::collections::HashMap;

const TABLE_ENGINE: &str = "MergeTree() ORDER BY tuple() SETTINGS index_granularity = 8192";

#[derive(Debug, Row, Deserialize)]
struct ColumnRow {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

/// ClickHouse-backed destination table.
pub struct ClickHouseTable {
    client: Client,
    database: String,
    table: String,
}

impl ClickHouseTable {
    pub fn new(endpoint: &str, database: &str, table: &str) -> anyhow::Result<Self> {
        if table.is_empty() {
            anyhow::bail!("ClickHouse table name must not be empty");
        }
        let mut client = Client::default()
            .with_url(endpoint)
            .with_database(database)
            .with_option("connect_timeout", "10")
            .with_option("receive_timeout", "300")
            // erase must finish before the new batch lands
            .with_option("mutations_sync", "2")
            .with_option("input_format_json_read_objects_as_strings", "1")
            .with_option("date_time_input_format", "best_effort");
        if let Ok(password) = std::env::var("SLUICE_CLICKHOUSE_PASSWORD") {
            let user = std::env::var("SLUICE_CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
            client = client.with_user(user).with_password(password);
        }

        Ok(Self {
            client,
            database: database.to_string(),
            table: table.to_string(),
        })
    }

    async fn columns(&self) -> Result<HashMap<String, String>, SinkError> {
        let rows = self
            .client
            .query("SELECT name, type FROM system.columns WHERE database = ? AND table = ?")
            .bind(self.database.as_str())
            .bind(self.table.as_str())
            .fetch_all::<ColumnRow>()
            .await
            .context("Read table columns")?;
        Ok(rows.into_iter().map(|r| (r.name, r.column_type)).collect())
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<(), SinkError> {
        let columns = schema
            .fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), column_type(f)))
            .collect::<Vec<_>>()
            .join(",\n    ");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n) ENGINE = {}",
            quote_ident(&self.table),
            columns,
            TABLE_ENGINE
        );
        self.client
            .query(&ddl)
            .execute()
            .await
            .context("Create ClickHouse table")?;
        tracing::info!("Created table {}.{}", self.database, self.table);
        Ok(())
    }

    /// Add the columns `evolve_schema` reports as new; retypes fail there.
    async fn evolve(&self, existing: &HashMap<String, String>, schema: &TableSchema) -> Result<(), SinkError> {
        let (_, added) = evolve_schema(&stored_schema(existing), &as_stored(schema))?;
        for field in added {
            let wanted = column_type(&field);
            let ddl = format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                quote_ident(&self.table),
                quote_ident(&field.name),
                wanted
            );
            self.client
                .query(&ddl)
                .execute()
                .await
                .with_context(|| format!("Add column {}", field.name))?;
            tracing::info!("Added column {} {} to {}", field.name, wanted, self.table);
        }
        Ok(())
    }
}

#[async_trait]
impl TableSink for ClickHouseTable {
    async fn delete_where(&self, project: &str, metric: &str) -> Result<u64, SinkError> {
        if self.columns().await?.is_empty() {
            return Err(SinkError::TableNotFound(format!("{}.{}", self.database, self.table)));
        }
        let sql = format!(
            "ALTER TABLE {} DELETE WHERE scanned_project = ? AND scanned_metric = ?",
            quote_ident(&self.table)
        );
        self.client
            .query(&sql)
            .bind(project)
            .bind(metric)
            .execute()
            .await
            .context("Delete stale rows")?;
        // mutations do not report affected rows
        Ok(0)
    }

    async fn load(&self, payload: &[u8], schema: &TableSchema) -> Result<u64, SinkError> {
        let text = std::str::from_utf8(payload).map_err(|e| SinkError::Rejected {
            errors: vec![format!("Payload is not valid UTF-8: {}", e)],
        })?;
        let rows = text.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        // an empty batch has no columns to create the table from
        if rows == 0 || schema.is_empty() {
            return Ok(0);
        }

        let existing = self.columns().await?;
        if existing.is_empty() {
            self.create_table(schema).await?;
        } else {
            self.evolve(&existing, schema).await?;
        }

        let column_list = schema
            .fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) FORMAT JSONEachRow\n{}",
            quote_ident(&self.table),
            column_list,
            text
        );
        match self.client.query(&escape_placeholders(&sql)).execute().await {
            Ok(()) => Ok(rows),
            Err(clickhouse::error::Error::BadResponse(message)) => Err(SinkError::Rejected {
                errors: message.lines().map(str::to_string).collect(),
            }),
            Err(e) => Err(SinkError::Backend(anyhow::Error::new(e).context("Insert batch"))),
        }
    }

    async fn schema(&self) -> Result<Option<TableSchema>, SinkError> {
        let columns = self.columns().await?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(stored_schema(&columns)))
    }
}

/// Schema as read back from `system.columns`, sorted by name.
fn stored_schema(columns: &HashMap<String, String>) -> TableSchema {
    let mut fields: Vec<FieldSchema> = columns
        .iter()
        .map(|(name, ty)| {
            let mut field = FieldSchema::nullable(name.clone(), field_type(ty));
            if ty.starts_with("Array(") {
                field.mode = FieldMode::Repeated;
            }
            field
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    TableSchema { fields }
}

/// An inferred schema as it will look once stored: TIME and RECORD
/// collapse into String columns.
fn as_stored(schema: &TableSchema) -> TableSchema {
    TableSchema {
        fields: schema
            .fields
            .iter()
            .map(|f| FieldSchema {
                name: f.name.clone(),
                field_type: field_type(&column_type(f)),
                mode: f.mode,
                fields: Vec::new(),
            })
            .collect(),
    }
}

/// ClickHouse column type for an inferred field.
pub fn column_type(field: &FieldSchema) -> String {
    let base = match field.field_type {
        FieldType::Boolean => "Bool",
        FieldType::Integer => "Int64",
        FieldType::Float => "Float64",
        FieldType::String | FieldType::Time | FieldType::Record => "String",
        FieldType::Timestamp => "DateTime64(6, 'UTC')",
        FieldType::Date => "Date32",
    };
    if field.is_repeated() {
        format!("Array({})", base)
    } else {
        format!("Nullable({})", base)
    }
}

fn field_type(column_type: &str) -> FieldType {
    let inner = column_type
        .trim_start_matches("Array(")
        .trim_start_matches("Nullable(")
        .trim_end_matches(')');
    match inner {
        "Bool" => FieldType::Boolean,
        "Int64" => FieldType::Integer,
        "Float64" => FieldType::Float,
        "Date32" => FieldType::Date,
        t if t.starts_with("DateTime64") => FieldType::Timestamp,
        _ => FieldType::String,
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// The client treats `?` as a bind placeholder. In a JSONEachRow body the
/// character can only occur inside strings, where its unicode escape is
/// equivalent.
fn escape_placeholders(sql: &str) -> String {
    sql.replace('?', "\\u003f")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_types() {
        let value = FieldSchema::nullable("value", FieldType::Float);
        assert_eq!(column_type(&value), "Nullable(Float64)");

        let mut tags = FieldSchema::nullable("tags", FieldType::String);
        tags.mode = FieldMode::Repeated;
        assert_eq!(column_type(&tags), "Array(String)");

        let ts = FieldSchema::nullable("ts", FieldType::Timestamp);
        assert_eq!(field_type(&column_type(&ts)), FieldType::Timestamp);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("value"), "`value`");
        assert_eq!(quote_ident("we`ird"), "`we\\`ird`");
    }

    #[test]
    fn test_escape_placeholders() {
        assert_eq!(
            escape_placeholders(r#"{"path":"/a?b=1"}"#),
            r#"{"path":"/a\u003fb=1"}"#
        );
    }

    #[test]
    fn test_evolution_uses_stored_types() {
        let mut existing = HashMap::new();
        existing.insert("at".to_string(), "Nullable(String)".to_string());
        existing.insert("value".to_string(), "Nullable(Float64)".to_string());

        // TIME is stored as String, so it is not a retype
        let incoming = TableSchema {
            fields: vec![
                FieldSchema::nullable("at", FieldType::Time),
                FieldSchema::nullable("value", FieldType::Float),
                FieldSchema::nullable("zone", FieldType::String),
            ],
        };
        let (_, added) = evolve_schema(&stored_schema(&existing), &as_stored(&incoming)).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "zone");

        let retyped = TableSchema {
            fields: vec![FieldSchema::nullable("value", FieldType::Integer)],
        };
        assert!(matches!(
            evolve_schema(&stored_schema(&existing), &as_stored(&retyped)),
            Err(SinkError::Schema(_))
        ));
    }
}
