//! Store metrics
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the application.

use std::time::Duration;

/// Record one engine request
pub fn record_request(operation: &str, status: u16, duration: Duration) {
    metrics::histogram!(
        "elastore_request_duration_seconds",
        "operation" => operation.to_string(),
    )
    .record(duration.as_secs_f64());

    metrics::counter!(
        "elastore_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a request that failed below HTTP (connect, timeout, ...)
pub fn record_request_error(operation: &str, error_type: &str) {
    metrics::counter!(
        "elastore_request_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record a retried request
pub fn record_retry(operation: &str, status: u16) {
    metrics::counter!(
        "elastore_request_retries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record the outcome of one bulk item
pub fn record_bulk_item(action: &str, outcome: &str) {
    metrics::counter!(
        "elastore_bulk_items_total",
        "action" => action.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record one bulk flush
pub fn record_bulk_flush(items: usize, bytes: usize, duration: Duration) {
    metrics::counter!("elastore_bulk_flushes_total").increment(1);
    metrics::histogram!("elastore_bulk_flush_items").record(items as f64);
    metrics::histogram!("elastore_bulk_flush_bytes").record(bytes as f64);
    metrics::histogram!("elastore_bulk_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Record a filter left out of a query because its value is not numeric
pub fn record_dropped_filter(operator: &str) {
    metrics::counter!(
        "elastore_dropped_filters_total",
        "operator" => operator.to_string(),
    )
    .increment(1);
}
