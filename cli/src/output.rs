//! Output formatting utilities for CLI commands

use colored::Colorize;
use sluice_shared::types::outcome::LoadOutcome;

/// Print success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    eprintln!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Outcome code on stdout for the invoking scheduler.
pub fn outcome(outcome: LoadOutcome) {
    let code = if outcome.is_success() {
        outcome.code().green().bold()
    } else {
        outcome.code().red().bold()
    };
    println!("{}", code);
}
