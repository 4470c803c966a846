//! One export run, end to end
//!
//! `INIT → QUERIED → MATERIALIZED → SCHEMA_INFERRED → ERASED → LOADED`.
//! Stages run sequentially and are never retried. A metric that fails at
//! query time is simply absent from every later stage; only setup errors
//! (token, staging file) abort the run.

use crate::auth::{self, TokenProvider};
use crate::config::ExporterConfig;
use crate::erase::erase_stale;
use crate::load::load_batch;
use crate::metrics;
use crate::query::MonitoringClient;
use crate::schema::{infer_schema, TableSchema};
use crate::sink::{self, TableSink};
use crate::stage::StagedBatch;
use anyhow::{Context, Result};
use sluice_shared::types::outcome::LoadOutcome;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Queried,
    Materialized,
    SchemaInferred,
    Erased,
    Loaded(LoadOutcome),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::Queried => f.write_str("QUERIED"),
            Self::Materialized => f.write_str("MATERIALIZED"),
            Self::SchemaInferred => f.write_str("SCHEMA_INFERRED"),
            Self::Erased => f.write_str("ERASED"),
            Self::Loaded(outcome) => write!(f, "LOADED({})", outcome.code()),
        }
    }
}

/// Everything a caller may want to know about a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: LoadOutcome,
    pub rows_loaded: u64,
    pub samples_collected: usize,
    /// Metrics whose query failed and contributed no rows
    pub failed_metrics: Vec<String>,
    /// `(metric, error)` for stale-row deletes that failed
    pub erase_failures: Vec<(String, String)>,
    /// Schema the batch was loaded with
    pub schema: TableSchema,
}

impl RunReport {
    /// Loaded, but stale rows may have been left behind next to the new ones.
    pub fn is_degraded(&self) -> bool {
        self.outcome.is_success() && !self.erase_failures.is_empty()
    }
}

pub struct Pipeline {
    config: ExporterConfig,
    tokens: Arc<dyn TokenProvider>,
    sink: Arc<dyn TableSink>,
}

impl Pipeline {
    pub fn new(
        config: ExporterConfig,
        tokens: Arc<dyn TokenProvider>,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        Self {
            config,
            tokens,
            sink,
        }
    }

    /// Wire the token provider and sink selected by `config`.
    pub async fn from_config(config: ExporterConfig) -> Result<Self> {
        let tokens = auth::from_config(&config.auth)?;
        let sink = sink::connect(&config.storage, &config.destination).await?;
        Ok(Self::new(config, tokens, sink))
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunReport> {
        let _timer = metrics::RUN_DURATION.start_timer();
        let config = &self.config;
        let project = config.scanned_project.as_str();
        let destination = config.destination.to_string();
        let mut state = RunState::Init;
        info!(
            "Exporting {} metrics of {} into {}",
            config.metrics.len(),
            project,
            config.destination.qualified()
        );

        let token = self
            .tokens
            .bearer_token()
            .await
            .context("Failed to obtain monitoring access token")?;
        let client = MonitoringClient::new(config.query_url(), project, token, config.label_collision)?;
        let queried = client.collect(&config.metrics).await;
        advance(&mut state, RunState::Queried);

        let batch = StagedBatch::materialize(&queried.samples, project, config.staging_dir.as_deref())?;
        advance(&mut state, RunState::Materialized);

        let schema = infer_schema(batch.reader()?, config.schema)
            .with_context(|| format!("Failed to infer schema from {}", batch.path().display()))?;
        debug!("Inferred {} columns: {:?}", schema.len(), schema.names().collect::<Vec<_>>());
        advance(&mut state, RunState::SchemaInferred);

        let erased = erase_stale(self.sink.as_ref(), &destination, project, &config.metrics).await;
        advance(&mut state, RunState::Erased);

        let loaded = load_batch(self.sink.as_ref(), &batch, &schema, &destination, project).await;
        advance(&mut state, RunState::Loaded(loaded.outcome));

        let report = RunReport {
            outcome: loaded.outcome,
            rows_loaded: loaded.rows,
            samples_collected: batch.rows(),
            failed_metrics: queried.failed_metrics,
            erase_failures: erased.failures,
            schema,
        };
        if report.is_degraded() {
            warn!(
                "Run loaded data but {} stale-row delete(s) failed; duplicates may exist for: {}",
                report.erase_failures.len(),
                report
                    .erase_failures
                    .iter()
                    .map(|(m, _)| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(report)
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug!("Run state {} -> {}", state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(RunState::SchemaInferred.to_string(), "SCHEMA_INFERRED");
        assert_eq!(
            RunState::Loaded(LoadOutcome::Failed).to_string(),
            "LOADED(LOAD_FAILED)"
        );
    }

    #[test]
    fn test_degraded_only_on_success() {
        let mut report = RunReport {
            outcome: LoadOutcome::Success,
            rows_loaded: 1,
            samples_collected: 1,
            failed_metrics: vec![],
            erase_failures: vec![("M1".to_string(), "boom".to_string())],
            schema: TableSchema::default(),
        };
        assert!(report.is_degraded());
        report.outcome = LoadOutcome::Failed;
        assert!(!report.is_degraded());
    }
}
