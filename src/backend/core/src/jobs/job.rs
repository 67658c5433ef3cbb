//! Job records and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{DocpressError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Client-visible job states.
///
/// Retry attempts do not surface as extra states: a job stays `running` while
/// the supervisor re-invokes the converter, and `retries` on the record
/// communicates attempt progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free worker slot
    Queued,
    /// A worker is executing (possibly re-executing) the conversion
    Running,
    /// Terminal success; the artifact is downloadable
    Done,
    /// Terminal failure after exhausting retries
    Failed,
    /// Terminal; artifact removed, record retained until TTL eviction
    Cleaned,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cleaned)
    }

    /// Check whether a transition to `next` is allowed.
    ///
    /// The machine is `queued → running → {done | failed} → cleaned`; nothing
    /// leaves `cleaned`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Failed)
                | (Self::Done, Self::Cleaned)
                | (Self::Failed, Self::Cleaned)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cleaned => write!(f, "cleaned"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// The lifecycle record of one conversion request.
///
/// A job owns its working directory (`workdir`) exclusively: the uploaded
/// input lives under `workdir/input/`, the artifact lands in `workdir`, and
/// the cleanup sweeper reclaims the whole directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned at admission
    pub id: JobId,
    /// Current state
    pub status: JobStatus,
    /// Uploaded input file
    pub input_path: PathBuf,
    /// Per-job working directory (also the converter's output directory)
    pub workdir: PathBuf,
    /// Produced artifact, set on success, cleared on cleanup
    pub output_path: Option<PathBuf>,
    /// Optional converter format directive
    pub convert_to: Option<String>,
    /// Attempts made beyond the first (0 on the first attempt)
    pub retries: u32,
    /// Retry budget carried on the record
    pub max_retries: u32,
    /// Failure reason, set only in `failed` state (and cleanup notes)
    pub error_message: Option<String>,
    /// When the job was admitted
    pub created_at: DateTime<Utc>,
    /// Set exactly once, at the first terminal transition
    pub finished_at: Option<DateTime<Utc>>,
    /// Last mutation of this record
    pub last_modified_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly admitted job in the `queued` state.
    pub fn new(
        id: JobId,
        input_path: PathBuf,
        workdir: PathBuf,
        convert_to: Option<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            input_path,
            workdir,
            output_path: None,
            convert_to,
            retries: 0,
            max_retries,
            error_message: None,
            created_at: now,
            finished_at: None,
            last_modified_at: now,
        }
    }

    /// The single state-machine entry point: every status change goes through
    /// here so monotonicity and the one-shot `finished_at` hold everywhere.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DocpressError::detailed(
                ErrorCode::InvalidStateTransition,
                "Invalid job state transition",
                format!("job {}: {} -> {}", self.id, self.status, next),
            ));
        }

        self.status = next;
        let now = Utc::now();
        self.last_modified_at = now;
        if matches!(next, JobStatus::Done | JobStatus::Failed) && self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
        Ok(())
    }
}
