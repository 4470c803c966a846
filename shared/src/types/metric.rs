//! Metric definitions
//!
//! A metric definition pairs a user-chosen name with the PromQL expression
//! that produces its series. The name ends up in the `scanned_metric` column
//! and is the unit of replacement when a run is repeated.

use serde::{Deserialize, Serialize};

/// One configured metric: a stable name and the query that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Name stored in the `scanned_metric` column
    pub name: String,

    /// PromQL expression sent to the monitoring API
    pub query: String,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Default metric set: daily compute instance CPU and uptime series.
pub fn default_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "COMPUTE_INSTANCE_CPU",
            "avg_over_time(compute_googleapis_com:instance_cpu_utilization[5m])[24h:5m]",
        ),
        MetricDefinition::new(
            "COMPUTE_INSTANCE_UPTIME",
            "delta(compute_googleapis_com:instance_uptime[5m])[24h:5m]",
        ),
        MetricDefinition::new(
            "COMPUTE_INSTANCE_CPU_AVG",
            "avg_over_time(compute_googleapis_com:instance_cpu_utilization[24h])[24h:24h]",
        ),
        MetricDefinition::new(
            "COMPUTE_INSTANCE_CPU_P95",
            "quantile_over_time(0.95, compute_googleapis_com:instance_cpu_utilization[24h])[24h:24h]",
        ),
    ]
}
