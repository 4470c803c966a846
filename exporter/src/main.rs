//! Exporter trigger
//!
//! Runs the pipeline once and prints the outcome code (`LOAD_SUCCESS` or
//! `LOAD_FAILED`) for the invoking scheduler. Exit status is 0 on success.

use anyhow::Result;
use clap::Parser;
use sluice_exporter::{metrics, ExporterConfig, Pipeline};
use sluice_shared::types::outcome::LoadOutcome;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sluice-exporter")]
#[command(about = "Export monitoring time series into a warehouse table", long_about = None)]
struct Args {
    /// TOML configuration file (defaults and SLUICE_* env vars otherwise)
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    /// Write Prometheus text metrics here after the run
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);

    let outcome = match run(&args).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Export run aborted: {:#}", e);
            LoadOutcome::Failed
        }
    };

    if let Some(path) = &args.metrics_file {
        if let Err(e) = std::fs::write(path, metrics::encode_metrics()) {
            warn!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    println!("{}", outcome.code());
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<LoadOutcome> {
    let config = ExporterConfig::load(args.config.as_deref())?;
    let pipeline = Pipeline::from_config(config).await?;
    let report = pipeline.run().await?;
    info!(
        "Run finished: {} ({} samples, {} rows loaded, {} failed metrics)",
        report.outcome,
        report.samples_collected,
        report.rows_loaded,
        report.failed_metrics.len()
    );
    Ok(report.outcome)
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries only the outcome code
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
