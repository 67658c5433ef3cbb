//! Document submission command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

use super::JobStatusResponse;

#[derive(Args)]
pub struct ConvertArgs {
    /// Document to convert
    pub file: PathBuf,

    /// Converter format directive (e.g. "pdf:writer_pdf_Export")
    #[arg(long = "to")]
    pub convert_to: Option<String>,

    /// Block server-side until the conversion finishes
    #[arg(long)]
    pub sync: bool,

    /// After an async submission, poll status until the job is terminal
    #[arg(long, conflicts_with = "sync")]
    pub wait: bool,

    /// Poll interval in seconds for --wait
    #[arg(long, default_value_t = 2)]
    pub poll_interval: u64,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct ConvertResponse {
    job_id: String,
    status: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub async fn execute(args: ConvertArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Input path has no filename")?;
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(bytes).file_name(filename.clone()),
    );
    if let Some(convert_to) = &args.convert_to {
        form = form.text("convert_to", convert_to.clone());
    }

    let path = if args.sync {
        "/api/v1/convert/sync"
    } else {
        "/api/v1/convert"
    };
    let response: ConvertResponse = client.post_multipart(path, form).await?;

    match format {
        OutputFormat::Table => {
            output::heading("Conversion Job");
            output::field("Job ID", &response.job_id);
            output::field("Status", &response.status);
            if let Some(url) = &response.download_url {
                output::field("Download", url);
            }
            if args.sync {
                output::success(&format!("{} converted", filename));
            } else {
                output::info("Submitted; poll with `docpress job status <id>`");
            }
        }
        _ => output::structured(&response, format),
    }

    if args.wait {
        let job = poll_until_terminal(client, &response.job_id, args.poll_interval).await?;
        match format {
            OutputFormat::Table => match job.status.as_str() {
                "done" => output::success(&format!(
                    "{} converted; download with `docpress job download {}`",
                    filename, job.job_id
                )),
                status => output::error(&format!(
                    "Job finished as {}: {}",
                    status,
                    job.message.as_deref().unwrap_or("no details")
                )),
            },
            _ => output::structured(&job, format),
        }
    }

    Ok(())
}

async fn poll_until_terminal(
    client: &ApiClient,
    job_id: &str,
    poll_interval: u64,
) -> Result<JobStatusResponse> {
    let interval = Duration::from_secs(poll_interval.max(1));
    loop {
        let job: JobStatusResponse = client.get_json(&format!("/api/v1/jobs/{}", job_id)).await?;
        if job.is_terminal() {
            return Ok(job);
        }
        if let Some(position) = job.queue_position {
            output::info(&format!("{} ({} ahead in queue)", job.status, position));
        } else {
            output::info(&format!("{} (retries: {})", job.status, job.retries));
        }
        tokio::time::sleep(interval).await;
    }
}
