//! Prometheus metrics for exporter runs

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

// ── Query metrics ────────────────────────────────────────────────────────────

pub static QUERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("sluice_queries_total", "Monitoring queries issued", &["status"]).unwrap()
});

pub static SAMPLES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("sluice_samples_total", "Samples returned by monitoring queries").unwrap()
});

// ── Sink metrics ─────────────────────────────────────────────────────────────

pub static ERASE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sluice_erase_total",
        "Stale-partition deletes attempted",
        &["status"]
    )
    .unwrap()
});

pub static LOAD_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("sluice_load_total", "Table loads by outcome", &["outcome"]).unwrap()
});

pub static LOAD_ROWS: Lazy<Counter> = Lazy::new(|| {
    register_counter!("sluice_load_rows_total", "Rows appended to the destination table").unwrap()
});

// ── Run metrics ──────────────────────────────────────────────────────────────

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "sluice_run_duration_seconds",
        "End-to-end export run latency",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
