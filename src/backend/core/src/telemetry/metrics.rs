//! Prometheus metrics for job throughput, queue depth, and conversion latency.
//!
//! The recorder is installed once at startup; `render()` backs the `/metrics`
//! endpoint. Recording helpers are no-ops until then, so library consumers
//! and tests need no metrics setup.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder and register metric descriptions.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);

    describe_counter!(
        "docpress_jobs_submitted_total",
        "Total number of conversion jobs admitted"
    );
    describe_counter!(
        "docpress_jobs_completed_total",
        "Total number of jobs that finished successfully"
    );
    describe_counter!(
        "docpress_jobs_failed_total",
        "Total number of jobs that failed after exhausting retries"
    );
    describe_counter!(
        "docpress_attempts_total",
        "Total conversion attempts by outcome"
    );
    describe_counter!(
        "docpress_errors_total",
        "Total errors by code and category"
    );

    describe_gauge!(
        "docpress_queue_depth",
        "Number of jobs waiting in the queue"
    );
    describe_gauge!(
        "docpress_running_jobs",
        "Number of jobs currently converting"
    );

    describe_histogram!(
        "docpress_conversion_duration_seconds",
        "Wall-clock duration of successful conversions"
    );

    Ok(())
}

/// Render the current metrics in Prometheus exposition format.
///
/// Returns an empty string when the recorder was never installed.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Record a job admission.
pub fn record_job_submitted() {
    counter!("docpress_jobs_submitted_total").increment(1);
}

/// Record a successful job completion.
pub fn record_job_completed(duration_secs: f64) {
    counter!("docpress_jobs_completed_total").increment(1);
    histogram!("docpress_conversion_duration_seconds").record(duration_secs);
}

/// Record a terminal job failure.
pub fn record_job_failed() {
    counter!("docpress_jobs_failed_total").increment(1);
}

/// Record the outcome of a single conversion attempt.
pub fn record_attempt(outcome: &'static str) {
    counter!("docpress_attempts_total", "outcome" => outcome).increment(1);
}

/// Update the queue depth gauge.
pub fn set_queue_depth(depth: usize) {
    gauge!("docpress_queue_depth").set(depth as f64);
}

/// Update the running jobs gauge.
pub fn set_running_jobs(count: usize) {
    gauge!("docpress_running_jobs").set(count as f64);
}
