//! CLI for Sluice
//!
//! - run: export monitoring series into the destination table once
//! - schema: infer the column schema of a line-delimited JSON file
//! - config: print the effective exporter configuration
//! - commits: per-author commit report for a GitHub repository

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod github;
mod output;
mod report;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice - monitoring export and repository reports", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the export pipeline once and print the outcome code
    Run(commands::run::RunArgs),

    /// Infer the table schema of a JSONL file
    Schema(commands::schema::SchemaArgs),

    /// Print the effective configuration as TOML
    Config(commands::config::ConfigArgs),

    /// Summarize commits per author for a GitHub repository
    Commits(commands::commits::CommitsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Schema(args) => commands::schema::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Commits(args) => commands::commits::run(args).await,
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

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
