//! Query executor
//!
//! Issues one PromQL query per configured metric against the monitoring
//! API and flattens every returned (series, timestamp) point into a
//! [`Sample`]. A metric whose query fails is logged and skipped; the other
//! metrics still contribute their samples.

use crate::metrics;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sluice_shared::types::metric::MetricDefinition;
use sluice_shared::types::sample::{is_fixed_field, Sample};
use sluice_shared::utils::time::from_epoch_secs;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// What to do when a series label reuses a pipeline-owned column name
/// (`query`, `scanned_metric`, `ts`, `value`, `scanned_project`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the pipeline's value and drop the label
    #[default]
    KeepFixed,
    /// Fail the whole metric
    Reject,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("monitoring API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("label {label} collides with a fixed column")]
    LabelCollision { label: String },
}

/// Prometheus HTTP API response envelope.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<SeriesResult>,
}

#[derive(Debug, Deserialize)]
struct SeriesResult {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// Range (matrix) results
    #[serde(default)]
    values: Vec<(Value, Value)>,
    /// Instant (vector) results
    #[serde(default)]
    value: Option<(Value, Value)>,
}

/// HTTP client for the project's Prometheus-compatible query endpoint.
pub struct MonitoringClient {
    http: reqwest::Client,
    url: String,
    project: String,
    token: Option<String>,
    collision: CollisionPolicy,
}

impl MonitoringClient {
    pub fn new(
        url: impl Into<String>,
        project: impl Into<String>,
        token: Option<String>,
        collision: CollisionPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            project: project.into(),
            token,
            collision,
        })
    }

    /// Run one metric's query and flatten the result.
    pub async fn query(&self, metric: &MetricDefinition) -> Result<Vec<Sample>, QueryError> {
        let mut request = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "query": metric.query }));
        if let Some(token) = &self.token {
            request = request
                .bearer_auth(token)
                .header("x-goog-user-project", &self.project);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let body = response.bytes().await?;
        let parsed: QueryResponse =
            serde_json::from_slice(&body).map_err(|e| QueryError::Decode(e.to_string()))?;
        flatten(metric, &self.project, parsed, self.collision)
    }

    /// Query every metric in turn. Failures are logged and recorded, never raised.
    pub async fn collect(&self, metrics_list: &[MetricDefinition]) -> QueryReport {
        let mut report = QueryReport::default();
        for metric in metrics_list {
            debug!("Querying {}: {}", metric.name, metric.query);
            match self.query(metric).await {
                Ok(samples) => {
                    info!("Metric {} returned {} samples", metric.name, samples.len());
                    metrics::QUERIES_TOTAL.with_label_values(&["ok"]).inc();
                    metrics::SAMPLES_TOTAL.inc_by(samples.len() as f64);
                    report.per_metric.insert(metric.name.clone(), samples.len());
                    report.samples.extend(samples);
                }
                Err(e) => {
                    warn!("Received non-success response for metric {}: {}", metric.name, e);
                    metrics::QUERIES_TOTAL.with_label_values(&["error"]).inc();
                    report.failed_metrics.push(metric.name.clone());
                }
            }
        }
        report
    }
}

fn flatten(
    metric: &MetricDefinition,
    project: &str,
    response: QueryResponse,
    collision: CollisionPolicy,
) -> Result<Vec<Sample>, QueryError> {
    let Some(data) = response.data else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::new();
    for series in data.result {
        let mut labels = BTreeMap::new();
        for (key, value) in series.metric {
            if is_fixed_field(&key) {
                match collision {
                    CollisionPolicy::KeepFixed => {
                        warn!(
                            "Dropping label {}={} of metric {}: collides with a fixed column",
                            key, value, metric.name
                        );
                        continue;
                    }
                    CollisionPolicy::Reject => {
                        return Err(QueryError::LabelCollision { label: key });
                    }
                }
            }
            labels.insert(key, value);
        }

        let points = series.values.into_iter().chain(series.value);
        for (raw_ts, value) in points {
            let Some(ts) = epoch_secs(&raw_ts).and_then(from_epoch_secs) else {
                warn!("Skipping point of {} with invalid timestamp {}", metric.name, raw_ts);
                continue;
            };
            samples.push(Sample {
                query: metric.query.clone(),
                scanned_metric: metric.name.clone(),
                ts,
                value,
                scanned_project: project.to_string(),
                labels: labels.clone(),
            });
        }
    }
    Ok(samples)
}

fn epoch_secs(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outcome of querying every configured metric.
#[derive(Debug, Default)]
pub struct QueryReport {
    /// All samples, in metric order
    pub samples: Vec<Sample>,
    /// Sample count per metric that answered successfully
    pub per_metric: BTreeMap<String, usize>,
    /// Metrics that contributed nothing because their query failed
    pub failed_metrics: Vec<String>,
}
