//! Per-author commit statistics

use crate::github::FileChange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStats {
    pub num_commits: u64,
    pub total_changes: u64,
    pub additions: u64,
    pub deletions: u64,
}

/// Author name -> totals. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitReport {
    authors: BTreeMap<String, AuthorStats>,
}

impl CommitReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one commit. Commits without file changes are not counted.
    pub fn record(&mut self, author: &str, files: &[FileChange]) -> bool {
        if files.is_empty() {
            return false;
        }
        let additions: u64 = files.iter().map(|f| f.additions).sum();
        let deletions: u64 = files.iter().map(|f| f.deletions).sum();

        let stats = self.authors.entry(author.to_string()).or_default();
        stats.num_commits += 1;
        stats.additions += additions;
        stats.deletions += deletions;
        stats.total_changes += additions + deletions;
        true
    }

    #[cfg(test)]
    pub fn get(&self, author: &str) -> Option<&AuthorStats> {
        self.authors.get(author)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AuthorStats)> {
        self.authors.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(additions: u64, deletions: u64) -> FileChange {
        FileChange {
            additions,
            deletions,
        }
    }

    #[test]
    fn test_totals_accumulate_per_author() {
        let mut report = CommitReport::new();
        assert!(report.record("Ada", &[file(10, 2), file(1, 0)]));
        assert!(report.record("Ada", &[file(0, 5)]));
        assert!(report.record("Lin", &[file(3, 3)]));

        let ada = report.get("Ada").unwrap();
        assert_eq!(ada.num_commits, 2);
        assert_eq!(ada.additions, 11);
        assert_eq!(ada.deletions, 7);
        assert_eq!(ada.total_changes, 18);
        assert_eq!(report.get("Lin").unwrap().total_changes, 6);
    }

    #[test]
    fn test_commit_without_files_is_skipped() {
        let mut report = CommitReport::new();
        assert!(!report.record("Ada", &[]));
        assert!(report.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut report = CommitReport::new();
        report.record("Ada", &[file(4, 1)]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Ada": {"num_commits": 1, "total_changes": 5, "additions": 4, "deletions": 1}
            })
        );
    }
}
