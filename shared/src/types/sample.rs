//! Monitoring samples
//!
//! A sample is one (resource, timestamp) point returned by a range query,
//! flattened into a single record: the fixed fields below plus every label
//! of the source series as its own column.

use crate::utils::time::ts_format;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column names owned by the pipeline. Labels may never use them.
pub const FIXED_FIELDS: [&str; 5] = ["query", "scanned_metric", "ts", "value", "scanned_project"];

/// Check whether `key` is one of the pipeline-owned columns.
pub fn is_fixed_field(key: &str) -> bool {
    FIXED_FIELDS.contains(&key)
}

/// One flattened monitoring data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// PromQL expression that produced this point
    pub query: String,

    /// Configured metric name
    pub scanned_metric: String,

    /// Point timestamp, second resolution, UTC
    #[serde(with = "ts_format")]
    pub ts: DateTime<Utc>,

    /// Point value as returned by the API (usually a quoted number)
    pub value: Value,

    /// Monitoring project the point was read from
    #[serde(default)]
    pub scanned_project: String,

    /// Series labels, one column each
    #[serde(flatten)]
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("instance_name".to_string(), "web-1".to_string());
        Sample {
            query: "up".to_string(),
            scanned_metric: "UP".to_string(),
            ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            value: json!("42.5"),
            scanned_project: "proj".to_string(),
            labels,
        }
    }

    #[test]
    fn test_labels_are_flattened() {
        let record = serde_json::to_value(sample()).unwrap();
        assert_eq!(record["instance_name"], "web-1");
        assert_eq!(record["ts"], "2023-11-14 22:13:20");
        assert_eq!(record["value"], "42.5");
        assert!(record.get("labels").is_none());
    }

    #[test]
    fn test_record_roundtrip() {
        let original = sample();
        let line = serde_json::to_string(&original).unwrap();
        let parsed: Sample = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_fixed_fields() {
        assert!(is_fixed_field("ts"));
        assert!(is_fixed_field("scanned_project"));
        assert!(!is_fixed_field("instance_name"));
    }
}
