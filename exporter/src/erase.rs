//! Stale-partition eraser
//!
//! Deletes the previous run's rows for every configured metric so that a
//! rerun replaces rather than duplicates. Deletes are best effort: a
//! failure is logged and recorded but never stops the load.

use crate::audit;
use crate::metrics;
use crate::sink::{SinkError, TableSink};
use sluice_shared::types::metric::MetricDefinition;
use tracing::{debug, info, warn};

/// Result of one erase pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EraseReport {
    /// Metrics whose delete went through
    pub erased: Vec<String>,
    /// `(metric, error)` for deletes that failed
    pub failures: Vec<(String, String)>,
}

/// Delete rows for `(project, metric)` for every metric in `metrics_list`,
/// including metrics whose query failed this run.
pub async fn erase_stale(
    sink: &dyn TableSink,
    table: &str,
    project: &str,
    metrics_list: &[MetricDefinition],
) -> EraseReport {
    let mut report = EraseReport::default();
    for metric in metrics_list {
        match sink.delete_where(project, &metric.name).await {
            Ok(rows) => {
                info!("Deleted stale rows of {} for {} from {}", metric.name, project, table);
                audit::partition_erased(table, project, &metric.name, rows);
                metrics::ERASE_TOTAL.with_label_values(&["ok"]).inc();
                report.erased.push(metric.name.clone());
            }
            Err(SinkError::TableNotFound(name)) => {
                // first run: nothing to replace
                debug!("Table {} does not exist yet, nothing to erase for {}", name, metric.name);
                metrics::ERASE_TOTAL.with_label_values(&["missing"]).inc();
                report.erased.push(metric.name.clone());
            }
            Err(e) => {
                warn!("Failed to delete stale rows of {} for {}: {}", metric.name, project, e);
                audit::partition_erase_failed(table, project, &metric.name, &e.to_string());
                metrics::ERASE_TOTAL.with_label_values(&["error"]).inc();
                report.failures.push((metric.name.clone(), e.to_string()));
            }
        }
    }
    report
}
