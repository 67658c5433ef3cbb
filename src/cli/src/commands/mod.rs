//! CLI command implementations.

pub mod config;
pub mod convert;
pub mod health;
pub mod job;
pub mod system;

use serde::Deserialize;

/// Job status payload returned by the server.
#[derive(Debug, Deserialize, serde::Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub queue_position: Option<usize>,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl JobStatusResponse {
    /// Whether the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "done" | "failed" | "cleaned")
    }
}
