//! Schema inference for staged batches
//!
//! Scans every JSON record of a batch and derives the column schema used by
//! the strict-schema load path. Columns are always NULLABLE (or REPEATED):
//! the destination only allows additive evolution, and labels vary between
//! series, so no column can be required.
//!
//! Type rules:
//! - JSON booleans/integers/floats map to BOOLEAN/INTEGER/FLOAT.
//! - Strings that parse as timestamps, dates or times map to
//!   TIMESTAMP/DATE/TIME, using the same checks the sinks validate with.
//! - Empty strings count as null.
//! - Unless `quoted_values_are_strings` is set, quoted numbers and booleans
//!   are typed by their content (`"42.5"` is FLOAT).
//! - INTEGER and FLOAT merge to FLOAT. Any other disagreement widens the
//!   column to STRING.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sluice_shared::utils::time::{is_date, is_time, is_timestamp};
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, warn};

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d+$").expect("integer pattern"));
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").expect("float pattern")
});

/// Inference switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Keep columns that were only ever null (typed STRING)
    pub keep_nulls: bool,

    /// Treat quoted scalars as STRING instead of inferring from their content
    pub quoted_values_are_strings: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            keep_nulls: true,
            quoted_values_are_strings: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    String,
    Timestamp,
    Date,
    Time,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Repeated,
}

/// One column of the schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            fields: Vec::new(),
        }
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }
}

/// Column schema of a table, serialized as a JSON array of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema document as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize schema")
    }
}

/// Observed kind of a column while scanning.
#[derive(Debug, Clone, PartialEq)]
enum Kind {
    /// Only null, empty arrays or empty objects seen so far
    Null,
    Boolean { quoted: bool },
    Integer { quoted: bool },
    Float { quoted: bool },
    String,
    Timestamp,
    Date,
    Time,
    Record(BTreeMap<String, Entry>),
}

impl Kind {
    /// Kinds that may silently widen to STRING.
    fn string_compatible(&self) -> bool {
        matches!(
            self,
            Kind::String
                | Kind::Timestamp
                | Kind::Date
                | Kind::Time
                | Kind::Boolean { quoted: true }
                | Kind::Integer { quoted: true }
                | Kind::Float { quoted: true }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    kind: Kind,
    /// `None` until a non-null value has been seen
    repeated: Option<bool>,
}

/// Incremental schema inference over JSON records.
#[derive(Debug)]
pub struct SchemaInferrer {
    options: SchemaOptions,
    columns: BTreeMap<String, Entry>,
    records: usize,
}

impl SchemaInferrer {
    pub fn new(options: SchemaOptions) -> Self {
        Self {
            options,
            columns: BTreeMap::new(),
            records: 0,
        }
    }

    /// Number of records observed.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Fold one record into the schema.
    pub fn observe(&mut self, record: &Map<String, Value>) {
        self.records += 1;
        observe_object(&mut self.columns, record, self.options, "");
    }

    /// Finish the scan and produce the schema, columns sorted by name.
    pub fn finish(self) -> TableSchema {
        TableSchema {
            fields: finalize(self.columns, self.options),
        }
    }
}

/// Infer a schema from line-delimited JSON. Blank lines are skipped; any
/// line that is not a JSON object is an error.
pub fn infer_schema<R: BufRead>(reader: R, options: SchemaOptions) -> Result<TableSchema> {
    let mut inferrer = SchemaInferrer::new(options);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Line {} is not valid JSON", idx + 1))?;
        match value {
            Value::Object(record) => inferrer.observe(&record),
            _ => anyhow::bail!("Line {} is not a JSON object", idx + 1),
        }
    }
    debug!("Inferred schema from {} records", inferrer.records());
    Ok(inferrer.finish())
}

fn observe_object(
    columns: &mut BTreeMap<String, Entry>,
    record: &Map<String, Value>,
    options: SchemaOptions,
    prefix: &str,
) {
    for (key, value) in record {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let observed = classify(value, options, &path);
        match columns.get_mut(key) {
            Some(existing) => merge_entry(existing, observed, &path),
            None => {
                columns.insert(key.clone(), observed);
            }
        }
    }
}

fn classify(value: &Value, options: SchemaOptions, path: &str) -> Entry {
    match value {
        Value::Array(items) => {
            let mut kind = Kind::Null;
            for item in items {
                let element = match item {
                    Value::Array(_) => {
                        warn!("Nested array in column {}, typing as STRING", path);
                        Kind::String
                    }
                    other => classify_scalar(other, options, path),
                };
                kind = merge_kind(kind, element, path);
            }
            Entry {
                kind,
                repeated: Some(true),
            }
        }
        Value::Null => Entry {
            kind: Kind::Null,
            repeated: None,
        },
        other => {
            let kind = classify_scalar(other, options, path);
            let repeated = if kind == Kind::Null { None } else { Some(false) };
            Entry { kind, repeated }
        }
    }
}

fn classify_scalar(value: &Value, options: SchemaOptions, path: &str) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Boolean { quoted: false },
        Value::Number(n) => {
            if n.is_i64() {
                Kind::Integer { quoted: false }
            } else {
                Kind::Float { quoted: false }
            }
        }
        Value::String(s) => classify_string(s, options),
        Value::Object(map) if map.is_empty() => Kind::Null,
        Value::Object(map) => {
            let mut children = BTreeMap::new();
            observe_object(&mut children, map, options, path);
            Kind::Record(children)
        }
        Value::Array(_) => Kind::String,
    }
}

fn classify_string(s: &str, options: SchemaOptions) -> Kind {
    if s.is_empty() {
        return Kind::Null;
    }
    if is_timestamp(s) {
        return Kind::Timestamp;
    }
    if is_date(s) {
        return Kind::Date;
    }
    if is_time(s) {
        return Kind::Time;
    }
    if options.quoted_values_are_strings {
        return Kind::String;
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return Kind::Boolean { quoted: true };
    }
    if INTEGER_RE.is_match(s) {
        // Quoted integers too wide for INT64 are still numbers
        return if s.parse::<i64>().is_ok() {
            Kind::Integer { quoted: true }
        } else {
            Kind::Float { quoted: true }
        };
    }
    if FLOAT_RE.is_match(s) {
        return Kind::Float { quoted: true };
    }
    Kind::String
}

fn merge_entry(existing: &mut Entry, observed: Entry, path: &str) {
    let repeated = match (existing.repeated, observed.repeated) {
        (Some(a), Some(b)) if a != b => {
            warn!("Column {} is both repeated and scalar, typing as STRING", path);
            existing.kind = Kind::String;
            existing.repeated = Some(false);
            return;
        }
        (Some(a), _) => Some(a),
        (None, b) => b,
    };
    let kind = std::mem::replace(&mut existing.kind, Kind::Null);
    existing.kind = merge_kind(kind, observed.kind, path);
    existing.repeated = repeated;
}

fn merge_kind(current: Kind, observed: Kind, path: &str) -> Kind {
    use Kind::*;
    match (current, observed) {
        (Null, k) | (k, Null) => k,
        (Record(mut a), Record(b)) => {
            for (key, entry) in b {
                let child_path = format!("{}.{}", path, key);
                match a.get_mut(&key) {
                    Some(existing) => merge_entry(existing, entry, &child_path),
                    None => {
                        a.insert(key, entry);
                    }
                }
            }
            Record(a)
        }
        (Boolean { quoted: a }, Boolean { quoted: b }) => Boolean { quoted: a && b },
        (Integer { quoted: a }, Integer { quoted: b }) => Integer { quoted: a && b },
        (Integer { quoted: a }, Float { quoted: b })
        | (Float { quoted: a }, Integer { quoted: b })
        | (Float { quoted: a }, Float { quoted: b }) => Float { quoted: a && b },
        (String, String) => String,
        (Timestamp, Timestamp) => Timestamp,
        (Date, Date) => Date,
        (Time, Time) => Time,
        (a, b) => {
            if !(a.string_compatible() && b.string_compatible()) {
                warn!("Conflicting types for column {}, typing as STRING", path);
            }
            String
        }
    }
}

fn finalize(columns: BTreeMap<String, Entry>, options: SchemaOptions) -> Vec<FieldSchema> {
    let mut fields = Vec::with_capacity(columns.len());
    for (name, entry) in columns {
        let mode = if entry.repeated == Some(true) {
            FieldMode::Repeated
        } else {
            FieldMode::Nullable
        };
        let (field_type, children) = match entry.kind {
            Kind::Null => {
                if !options.keep_nulls {
                    continue;
                }
                (FieldType::String, Vec::new())
            }
            Kind::Record(children) => {
                let children = finalize(children, options);
                if children.is_empty() {
                    if !options.keep_nulls {
                        continue;
                    }
                    (FieldType::String, Vec::new())
                } else {
                    (FieldType::Record, children)
                }
            }
            Kind::Boolean { .. } => (FieldType::Boolean, Vec::new()),
            Kind::Integer { .. } => (FieldType::Integer, Vec::new()),
            Kind::Float { .. } => (FieldType::Float, Vec::new()),
            Kind::String => (FieldType::String, Vec::new()),
            Kind::Timestamp => (FieldType::Timestamp, Vec::new()),
            Kind::Date => (FieldType::Date, Vec::new()),
            Kind::Time => (FieldType::Time, Vec::new()),
        };
        fields.push(FieldSchema {
            name,
            field_type,
            mode,
            fields: children,
        });
    }
    fields
}
