//! Job status and artifact download commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

use super::JobStatusResponse;

#[derive(Subcommand)]
pub enum JobCommands {
    /// Show the status of a job
    Status {
        /// Job ID
        id: Uuid,
    },

    /// Download the artifact of a finished job
    Download {
        /// Job ID
        id: Uuid,

        /// Where to write the artifact (defaults to <job-id>.pdf)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
}

pub async fn execute(cmd: JobCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        JobCommands::Status { id } => {
            let job: JobStatusResponse = client.get_json(&format!("/api/v1/jobs/{}", id)).await?;

            match format {
                OutputFormat::Table => {
                    output::heading("Job Status");
                    output::field("Job ID", &job.job_id);
                    output::field("Status", &job.status);
                    output::field(
                        "Retries",
                        &format!("{}/{}", job.retries, job.max_retries),
                    );
                    output::field("Created", &job.created_at);
                    if let Some(finished) = &job.finished_at {
                        output::field("Finished", finished);
                    }
                    if let Some(position) = job.queue_position {
                        output::field("Queue position", &position.to_string());
                    }
                    if let Some(message) = &job.message {
                        output::field("Message", message);
                    }
                    if let Some(url) = &job.download_url {
                        output::field("Download", url);
                    }
                }
                _ => output::structured(&job, format),
            }
        }

        JobCommands::Download { id, dest } => {
            let bytes = client
                .get_bytes(&format!("/api/v1/jobs/{}/download", id))
                .await?;

            let target = dest.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", id)));
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;

            output::success(&format!(
                "Wrote {} bytes to {}",
                bytes.len(),
                target.display()
            ));
        }
    }

    Ok(())
}
