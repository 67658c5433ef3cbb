//! Aggregate system status command.

use anyhow::Result;
use clap::Args;
use serde::Deserialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct SystemArgs {}

#[derive(Debug, Deserialize, serde::Serialize)]
struct SystemStatusResponse {
    status: String,
    uptime_seconds: u64,
    convert_timeout_seconds: u64,
    max_concurrency: usize,
    max_retries: u32,
    max_queue_size: usize,
    artifact_ttl_seconds: u64,
    record_ttl_seconds: u64,
    total_jobs: usize,
    queue_length: usize,
    running_jobs: usize,
    done_jobs: usize,
    failed_jobs: usize,
    cleaned_jobs: usize,
    peak_concurrency: usize,
    cpu_cores: usize,
    data_dir_used_bytes: u64,
    data_dir_free_bytes: u64,
}

#[derive(Tabled)]
struct MetricRow {
    metric: String,
    value: String,
}

impl MetricRow {
    fn new(metric: &str, value: impl ToString) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.to_string(),
        }
    }
}

pub async fn execute(_args: SystemArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: SystemStatusResponse = client.get_json("/api/v1/system/status").await?;

    match format {
        OutputFormat::Table => {
            let rows = vec![
                MetricRow::new("status", &status.status),
                MetricRow::new("uptime (s)", status.uptime_seconds),
                MetricRow::new("total jobs", status.total_jobs),
                MetricRow::new("queued", status.queue_length),
                MetricRow::new("running", status.running_jobs),
                MetricRow::new("done", status.done_jobs),
                MetricRow::new("failed", status.failed_jobs),
                MetricRow::new("cleaned", status.cleaned_jobs),
                MetricRow::new("peak concurrency", status.peak_concurrency),
                MetricRow::new("max concurrency", status.max_concurrency),
                MetricRow::new("max retries", status.max_retries),
                MetricRow::new("max queue size", status.max_queue_size),
                MetricRow::new("convert timeout (s)", status.convert_timeout_seconds),
                MetricRow::new("artifact TTL (s)", status.artifact_ttl_seconds),
                MetricRow::new("record TTL (s)", status.record_ttl_seconds),
                MetricRow::new("cpu cores", status.cpu_cores),
                MetricRow::new("data dir used (bytes)", status.data_dir_used_bytes),
                MetricRow::new("data dir free (bytes)", status.data_dir_free_bytes),
            ];
            output::heading("System Status");
            output::table(&rows);
        }
        _ => output::structured(&status, format),
    }

    Ok(())
}
