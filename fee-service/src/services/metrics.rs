//! Prometheus metrics for fee-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Session stores opened in this process, split by whether the file was new.
pub static SESSION_STORES_OPENED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_session_stores_opened_total",
        "Total number of session stores opened",
        &["created"]
    )
    .expect("Failed to register session_stores_opened")
});

/// Students considered during carry-forward, by outcome.
pub static CARRY_FORWARD_STUDENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_carry_forward_students_total",
        "Total number of students processed by carry-forward",
        &["outcome"] // seeded, skipped, failed
    )
    .expect("Failed to register carry_forward_students")
});

/// Receipt submissions, by outcome.
pub static RECEIPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_receipts_total",
        "Total number of receipt submissions",
        &["outcome"] // recorded, duplicate
    )
    .expect("Failed to register receipts_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fee_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SESSION_STORES_OPENED);
    Lazy::force(&CARRY_FORWARD_STUDENTS);
    Lazy::force(&RECEIPTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
