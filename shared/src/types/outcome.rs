//! Load outcome reported once per run

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of the final load step. The caller only ever sees this value;
/// row-level diagnostics live in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadOutcome {
    Success,
    Failed,
}

impl LoadOutcome {
    /// Outcome code returned to the invoking scheduler.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "LOAD_SUCCESS",
            Self::Failed => "LOAD_FAILED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
