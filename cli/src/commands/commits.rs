//! Commits command implementation

use crate::github::{GitHubClient, DEFAULT_API_BASE};
use crate::output;
use crate::report::CommitReport;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct CommitsArgs {
    /// Repository owner (user or organization)
    #[arg(long)]
    pub owner: String,

    /// Repository name
    #[arg(long)]
    pub repo: String,

    /// Branch to walk
    #[arg(short, long, default_value = "dev")]
    pub branch: String,

    /// Personal access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API base URL (GitHub Enterprise)
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_url: String,

    /// Also write the report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: CommitsArgs) -> Result<()> {
    let client = GitHubClient::new(&args.api_url, args.token.clone())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Listing commits of {}/{}@{}", args.owner, args.repo, args.branch));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let commits = client
        .list_commits(&args.owner, &args.repo, &args.branch)
        .await
        .context("Error fetching commits")?;
    spinner.finish_and_clear();

    if commits.is_empty() {
        output::warning("No commits found.");
        return Ok(());
    }
    output::info(&format!("{} commit(s) on {}", commits.len(), args.branch));

    let progress = ProgressBar::new(commits.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        progress.set_style(style);
    }

    let mut report = CommitReport::new();
    let mut skipped = 0usize;
    for commit in &commits {
        progress.set_message(commit.sha.chars().take(7).collect::<String>());
        match client.commit_files(&args.owner, &args.repo, &commit.sha).await {
            Ok(files) => {
                report.record(&commit.commit.author.name, &files);
            }
            Err(e) => {
                warn!("Error fetching commit files for {}: {:#}", commit.sha, e);
                skipped += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!("{}", "Commit Report:".bold());
    for (author, stats) in report.iter() {
        println!("{}:", author.cyan());
        println!("  Number of Commits: {}", stats.num_commits);
        println!(
            "  Total Changes: {} ({}, {})",
            stats.total_changes,
            format!("+{}", stats.additions).green(),
            format!("-{}", stats.deletions).red()
        );
    }
    if skipped > 0 {
        output::warning(&format!("{} commit(s) skipped after fetch errors", skipped));
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        output::success(&format!("Report written to {}", path.display()));
    }

    Ok(())
}
