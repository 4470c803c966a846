//! Time-related utilities
//!
//! Sample timestamps are stored as fixed-format UTC strings
//! (`YYYY-MM-DD HH:MM:SS`), which the warehouse reads as TIMESTAMP.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Format used for the `ts` column.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert epoch seconds (possibly fractional) to a UTC instant.
///
/// The sub-second part is dropped. Returns `None` for NaN, infinities and
/// values outside the representable range.
pub fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs.floor() as i64, 0)
}

/// Render an instant in the `ts` column format.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a `ts` column value. Accepts the column format as well as RFC 3339.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TS_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp: {}", raw))
}

/// Civil date-time layouts accepted for TIMESTAMP columns, after an
/// optional trailing ` UTC` or `Z` is stripped.
const TIMESTAMP_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Whether a string is a TIMESTAMP column value.
///
/// Schema inference and load-time validation both go through this, so a
/// string typed TIMESTAMP is always loadable as one.
pub fn is_timestamp(raw: &str) -> bool {
    if parse_ts(raw).is_ok() {
        return true;
    }
    let civil = raw
        .strip_suffix(" UTC")
        .or_else(|| raw.strip_suffix('Z'))
        .unwrap_or(raw);
    TIMESTAMP_LAYOUTS
        .iter()
        .any(|layout| NaiveDateTime::parse_from_str(civil, layout).is_ok())
}

/// Whether a string is a DATE column value (`YYYY-MM-DD`).
pub fn is_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

/// Whether a string is a TIME column value (`HH:MM:SS[.ffffff]`).
pub fn is_time(raw: &str) -> bool {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f").is_ok()
}

/// Serde adapter for `DateTime<Utc>` fields written in the `ts` column format.
pub mod ts_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_ts(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_ts(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_to_ts() {
        let ts = from_epoch_secs(1_700_000_000.0).unwrap();
        assert_eq!(format_ts(&ts), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_fractional_seconds_truncated() {
        let ts = from_epoch_secs(1_700_000_000.75).unwrap();
        assert_eq!(format_ts(&ts), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_invalid_epoch() {
        assert!(from_epoch_secs(f64::NAN).is_none());
        assert!(from_epoch_secs(f64::INFINITY).is_none());
        assert!(from_epoch_secs(1e20).is_none());
    }

    #[test]
    fn test_parse_both_formats() {
        let a = parse_ts("2023-11-14 22:13:20").unwrap();
        let b = parse_ts("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_ts("yesterday").is_err());
    }

    #[test]
    fn test_temporal_checks() {
        assert!(is_timestamp("2023-11-14 22:13:20"));
        assert!(is_timestamp("2023-11-14T22:13:20.5Z"));
        assert!(is_timestamp("2023-11-14 22:13:20.123 UTC"));
        assert!(!is_timestamp("2023-11-14 22:13:20+05"));
        assert!(!is_timestamp("2023-11-14 22:13:20 +05:00"));
        assert!(!is_timestamp("2023-11-14 22:13:20UTC"));
        assert!(!is_timestamp("2023-11-14"));

        assert!(is_date("2023-01-02"));
        assert!(!is_date("2023-13-45"));

        assert!(is_time("10:11:12"));
        assert!(is_time("10:11:12.250"));
        assert!(!is_time("25:61:00"));
    }
}
