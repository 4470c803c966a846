//! Audit logging for destructive and data-landing table operations.
//!
//! Events are emitted via `tracing` under a dedicated target so they can be
//! routed to a separate sink (e.g. JSON) and kept longer than run logs.

use tracing::{info, warn};

const AUDIT_TARGET: &str = "sluice::audit";

/// Rows for one (project, metric) partition were deleted.
pub fn partition_erased(table: &str, project: &str, metric: &str, rows: u64) {
    info!(
        target: AUDIT_TARGET,
        event = "partition_erased",
        table = %table,
        project = %project,
        metric = %metric,
        rows = rows,
    );
}

/// Deleting a partition failed; stale rows may remain.
pub fn partition_erase_failed(table: &str, project: &str, metric: &str, reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "partition_erase_failed",
        table = %table,
        project = %project,
        metric = %metric,
        reason = %reason,
    );
}

/// A batch was appended to the destination table.
pub fn batch_loaded(table: &str, project: &str, rows: u64) {
    info!(
        target: AUDIT_TARGET,
        event = "batch_loaded",
        table = %table,
        project = %project,
        rows = rows,
    );
}

/// The destination refused the batch.
pub fn batch_rejected(table: &str, project: &str, errors: usize) {
    warn!(
        target: AUDIT_TARGET,
        event = "batch_rejected",
        table = %table,
        project = %project,
        errors = errors,
    );
}
