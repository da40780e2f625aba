//! Metrics module for integration-service.
//! Provides Prometheus metrics for usage reporting, activity flushing and
//! maintenance administration.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder behind the `metrics` facade used by the HTTP middleware.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "integration_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Duration of one activity flush cycle
pub static ACTIVITY_FLUSH_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Rows written by activity flushes
pub static ACTIVITY_FLUSHED_ROWS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Failed activity flush cycles
pub static ACTIVITY_FLUSH_FAILURES_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Subjects currently held in memory
pub static ACTIVITY_TRACKED_SUBJECTS: OnceLock<IntGauge> = OnceLock::new();

/// Usage reports by outcome
pub static USAGE_REPORTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Maintenance operations by operation and outcome
pub static MAINTENANCE_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            // Another recorder owns the facade; keep a detached one so rendering still works.
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            PrometheusBuilder::new().build_recorder().handle()
        }
    });

    ACTIVITY_FLUSH_DURATION.get_or_init(|| {
        register_histogram!(histogram_opts!(
            "integration_activity_flush_duration_seconds",
            "Duration of activity ledger flush cycles"
        ))
        .expect("Failed to register ACTIVITY_FLUSH_DURATION")
    });

    ACTIVITY_FLUSHED_ROWS_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "integration_activity_flushed_rows_total",
            "Activity rows written to the database"
        ))
        .expect("Failed to register ACTIVITY_FLUSHED_ROWS_TOTAL")
    });

    ACTIVITY_FLUSH_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "integration_activity_flush_failures_total",
            "Activity flush cycles that failed and will be retried"
        ))
        .expect("Failed to register ACTIVITY_FLUSH_FAILURES_TOTAL")
    });

    ACTIVITY_TRACKED_SUBJECTS.get_or_init(|| {
        register_int_gauge!(opts!(
            "integration_activity_tracked_subjects",
            "Users and projects with a known last activity"
        ))
        .expect("Failed to register ACTIVITY_TRACKED_SUBJECTS")
    });

    USAGE_REPORTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "integration_usage_reports_total",
                "Usage reports by category and outcome"
            ),
            &["category", "outcome"]
        )
        .expect("Failed to register USAGE_REPORTS_TOTAL")
    });

    MAINTENANCE_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "integration_maintenance_operations_total",
                "Maintenance administration calls by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register MAINTENANCE_OPERATIONS_TOTAL")
    });
}

/// Render every metric in the Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return output;
    }
    if let Ok(custom_metrics) = String::from_utf8(buffer) {
        output.push_str(&custom_metrics);
    }
    output
}

pub fn record_flush(duration_secs: f64, rows: usize) {
    if let Some(h) = ACTIVITY_FLUSH_DURATION.get() {
        h.observe(duration_secs);
    }
    if let Some(c) = ACTIVITY_FLUSHED_ROWS_TOTAL.get() {
        c.inc_by(rows as u64);
    }
}

pub fn record_flush_failure() {
    if let Some(c) = ACTIVITY_FLUSH_FAILURES_TOTAL.get() {
        c.inc();
    }
}

pub fn set_tracked_subjects(count: usize) {
    if let Some(g) = ACTIVITY_TRACKED_SUBJECTS.get() {
        g.set(count as i64);
    }
}

pub fn record_usage_report(category: &str, outcome: &str) {
    if let Some(c) = USAGE_REPORTS_TOTAL.get() {
        c.with_label_values(&[category, outcome]).inc();
    }
}

pub fn record_maintenance_operation(operation: &str, outcome: &str) {
    if let Some(c) = MAINTENANCE_OPERATIONS_TOTAL.get() {
        c.with_label_values(&[operation, outcome]).inc();
    }
}
