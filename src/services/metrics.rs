//! Metrics module for the receivables engine.
//! Provides Prometheus metrics for store and settlement operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "receivables_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Receivable operations counter
pub static RECEIVABLE_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plan operations counter
pub static PLAN_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Settlement operations counter
pub static SETTLEMENT_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    RECEIVABLE_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "receivables_receivable_operations_total",
                "Total receivable operations by operation type"
            ),
            &["operation"]
        )
        .expect("Failed to register RECEIVABLE_OPERATIONS_TOTAL")
    });

    PLAN_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "receivables_plan_operations_total",
                "Total plan operations by operation type"
            ),
            &["operation"]
        )
        .expect("Failed to register PLAN_OPERATIONS_TOTAL")
    });

    SETTLEMENT_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "receivables_settlement_operations_total",
                "Total settlement operations by operation type"
            ),
            &["operation"]
        )
        .expect("Failed to register SETTLEMENT_OPERATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "receivables_errors_total",
                "Total errors by type for alerting"
            ),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a receivable operation.
pub fn record_receivable_operation(operation: &str) {
    if let Some(counter) = RECEIVABLE_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record a plan operation.
pub fn record_plan_operation(operation: &str) {
    if let Some(counter) = PLAN_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record a settlement operation.
pub fn record_settlement_operation(operation: &str) {
    if let Some(counter) = SETTLEMENT_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
