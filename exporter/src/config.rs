//! Exporter configuration
//!
//! Defaults describe the stock deployment (four compute metrics loaded into
//! `metrics_export.timeseries_data`). A TOML file and `SLUICE_*` environment
//! variables are layered on top, e.g. `SLUICE_DESTINATION__TABLE=daily`.

use crate::query::CollisionPolicy;
use crate::schema::SchemaOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sluice_shared::types::metric::{default_metrics, MetricDefinition};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MONITORING_ENDPOINT: &str = "https://monitoring.googleapis.com";
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";

/// OAuth scopes requested for the monitoring token.
pub const DEFAULT_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.file",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Monitoring project whose series are exported
    pub scanned_project: String,

    /// Base URL of the monitoring API
    pub monitoring_endpoint: String,

    /// Where the rows land
    pub destination: DestinationConfig,

    /// Schema inference switches
    pub schema: SchemaOptions,

    /// What to do when a series label reuses a pipeline-owned column name
    pub label_collision: CollisionPolicy,

    /// Directory for the staged JSONL artifact (system temp dir when unset)
    pub staging_dir: Option<PathBuf>,

    /// Sink backend
    pub storage: StorageConfig,

    /// How the bearer token for the monitoring API is obtained
    pub auth: AuthConfig,

    /// Metric name -> PromQL expression
    pub metrics: Vec<MetricDefinition>,
}

/// Destination table coordinates.
///
/// `table` names the sink table and `dataset` is the ClickHouse database
/// unless `storage.database` overrides it. `project` and `location` only
/// label the destination in logs and [`DestinationConfig::qualified`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub location: String,
}

impl DestinationConfig {
    /// `project.dataset.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.table)
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            project: "DATASET_PROJECT_ID".to_string(),
            dataset: "metrics_export".to_string(),
            table: "timeseries_data".to_string(),
            location: "asia-south1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "clickhouse")]
    ClickHouse {
        endpoint: String,
        /// Falls back to `destination.dataset` when empty
        #[serde(default)]
        database: String,
    },
    #[serde(rename = "memory")]
    InMemory,
}

impl StorageConfig {
    /// Database holding the destination table, `None` for in-memory storage.
    pub fn database<'a>(&'a self, destination: &'a DestinationConfig) -> Option<&'a str> {
        match self {
            Self::ClickHouse { database, .. } if !database.trim().is_empty() => Some(database),
            Self::ClickHouse { .. } => Some(&destination.dataset),
            Self::InMemory => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    /// Access token from the compute metadata server
    #[serde(rename = "metadata_server")]
    MetadataServer {
        #[serde(default = "default_metadata_endpoint")]
        endpoint: String,
        #[serde(default = "default_scopes")]
        scopes: Vec<String>,
    },
    /// Fixed token, e.g. injected by CI
    #[serde(rename = "static")]
    Static { token: String },
    /// No Authorization header
    #[serde(rename = "none")]
    None,
}

// Keep tokens out of logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataServer { endpoint, scopes } => f
                .debug_struct("MetadataServer")
                .field("endpoint", endpoint)
                .field("scopes", scopes)
                .finish(),
            Self::Static { .. } => f.debug_struct("Static").field("token", &"<redacted>").finish(),
            Self::None => f.write_str("None"),
        }
    }
}

fn default_metadata_endpoint() -> String {
    DEFAULT_METADATA_ENDPOINT.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::MetadataServer {
            endpoint: default_metadata_endpoint(),
            scopes: default_scopes(),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            scanned_project: "MONITORING_PROJECT_ID".to_string(),
            monitoring_endpoint: DEFAULT_MONITORING_ENDPOINT.to_string(),
            destination: DestinationConfig::default(),
            schema: SchemaOptions::default(),
            label_collision: CollisionPolicy::default(),
            staging_dir: None,
            storage: StorageConfig::InMemory,
            auth: AuthConfig::default(),
            metrics: default_metrics(),
        }
    }
}

impl ExporterConfig {
    /// Layer defaults, an optional TOML file and `SLUICE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to encode default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SLUICE")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: Self = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scanned_project.trim().is_empty() {
            anyhow::bail!("scanned_project must not be empty");
        }
        if self.monitoring_endpoint.trim().is_empty() {
            anyhow::bail!("monitoring_endpoint must not be empty");
        }
        if self.destination.dataset.trim().is_empty() || self.destination.table.trim().is_empty() {
            anyhow::bail!("destination dataset and table must be set");
        }
        if self.metrics.is_empty() {
            anyhow::bail!("At least one metric must be configured");
        }

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if metric.name.trim().is_empty() {
                anyhow::bail!("Metric names must not be empty");
            }
            if metric.query.trim().is_empty() {
                anyhow::bail!("Metric {} has an empty query", metric.name);
            }
            if !seen.insert(metric.name.as_str()) {
                anyhow::bail!("Duplicate metric name: {}", metric.name);
            }
        }

        Ok(())
    }

    /// Range-query URL for the scanned project.
    pub fn query_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/location/global/prometheus/api/v1/query",
            self.monitoring_endpoint.trim_end_matches('/'),
            self.scanned_project
        )
    }

    /// Effective configuration as TOML (tokens included, handle with care).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}
