//! Prometheus metrics for quotation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// HTTP request counter by route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_http_requests_total",
        "Total number of HTTP requests",
        &["route", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// Quotation counter by status.
pub static QUOTATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_quotations_total",
        "Total number of quotations by status",
        &["status"] // draft, sent, viewed, accepted, rejected, expired, cancelled
    )
    .expect("Failed to register quotations_total")
});

/// Access link views counter.
pub static LINK_VIEWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_link_views_total",
        "Total number of access link views",
        &["outcome"] // first_view, repeat_view, expired, not_found
    )
    .expect("Failed to register link_views_total")
});

/// Scheduler sweep counter by sweep name and outcome.
pub static SWEEP_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_sweep_runs_total",
        "Total number of scheduler sweep runs",
        &["sweep", "outcome"] // ok, error
    )
    .expect("Failed to register sweep_runs_total")
});

/// Items processed per sweep.
pub static SWEEP_ITEMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_sweep_items_total",
        "Total number of items touched by scheduler sweeps",
        &["sweep", "outcome"] // processed, failed
    )
    .expect("Failed to register sweep_items_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quotation_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quotation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&QUOTATIONS_TOTAL);
    Lazy::force(&LINK_VIEWS_TOTAL);
    Lazy::force(&SWEEP_RUNS_TOTAL);
    Lazy::force(&SWEEP_ITEMS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
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
