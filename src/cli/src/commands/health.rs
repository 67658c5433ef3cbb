//! Server health command.

use anyhow::Result;
use clap::Args;
use serde::Deserialize;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

pub async fn execute(_args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let payload = client.get_value("/health").await?;

    if !matches!(format, OutputFormat::Table) {
        output::structured(&payload, format);
        return Ok(());
    }

    let health: HealthResponse = serde_json::from_value(payload)?;

    output::heading("Server Health");
    output::field("endpoint", client.base_url());
    output::field("status", &health.status);
    if let Some(version) = &health.version {
        output::field("version", version);
    }
    if let Some(timestamp) = &health.timestamp {
        output::field("timestamp", timestamp);
    }

    if health.status == "ok" {
        output::success("Server is reachable");
    } else {
        output::error(&format!("Server reports status '{}'", health.status));
    }

    Ok(())
}
