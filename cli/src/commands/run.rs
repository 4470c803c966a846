//! Run command implementation

use crate::output;
use anyhow::Result;
use clap::Args;
use sluice_exporter::{metrics, ExporterConfig, Pipeline, RunReport};
use sluice_shared::types::outcome::LoadOutcome;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file
    #[arg(short, long, env = "SLUICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write Prometheus text metrics here after the run
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let report = execute(&args).await;

    let outcome = match &report {
        Ok(report) => {
            for metric in &report.failed_metrics {
                output::warning(&format!("No data for {} (query failed)", metric));
            }
            if report.is_degraded() {
                output::warning(&format!(
                    "{} stale-row delete(s) failed; rows may be duplicated",
                    report.erase_failures.len()
                ));
            }
            if report.outcome.is_success() {
                output::success(&format!(
                    "Loaded {} of {} samples",
                    report.rows_loaded, report.samples_collected
                ));
            }
            report.outcome
        }
        Err(e) => {
            output::error(&format!("{:#}", e));
            LoadOutcome::Failed
        }
    };

    if let Some(path) = &args.metrics_file {
        if let Err(e) = std::fs::write(path, metrics::encode_metrics()) {
            output::warning(&format!("Failed to write metrics to {}: {}", path.display(), e));
        }
    }

    output::outcome(outcome);
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(args: &RunArgs) -> Result<RunReport> {
    let config = ExporterConfig::load(args.config.as_deref())?;
    output::info(&format!(
        "Exporting {} metric(s) of {} into {}",
        config.metrics.len(),
        config.scanned_project,
        config.destination.qualified()
    ));
    Pipeline::from_config(config).await?.run().await
}
