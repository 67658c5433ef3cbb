//! API request handlers with proper error propagation.
//!
//! Handlers return `Result<impl IntoResponse, DocpressError>` so errors are
//! automatically converted to the right HTTP status via the `IntoResponse`
//! implementation on `DocpressError`.

use axum::{
    body::Body,
    extract::{
        multipart::{Field, Multipart},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::error::{DocpressError, ErrorCode, Result};
use crate::jobs::{ConvertService, Job, JobId, JobStatus, StagedUpload};
use crate::telemetry::metrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct ConvertResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Async submission: returns `202 Accepted` with the job id immediately.
pub async fn convert_async(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (staged, convert_to) = receive_upload(&state.service, multipart).await?;

    let job = match state.service.submit(&staged, convert_to) {
        Ok(job) => job,
        Err(e) => {
            state.service.discard_staged(&staged).await;
            return Err(e);
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(ConvertResponse {
            job_id: job.id,
            status: job.status,
            download_url: None,
            message: None,
        })),
    ))
}

/// Sync submission: blocks until the job reaches a terminal state.
pub async fn convert_sync(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (staged, convert_to) = receive_upload(&state.service, multipart).await?;

    let job = match state.service.submit(&staged, convert_to) {
        Ok(job) => job,
        Err(e) => {
            state.service.discard_staged(&staged).await;
            return Err(e);
        }
    };

    let finished = state.service.wait(job.id).await?;
    match finished.status {
        JobStatus::Done => Ok((
            StatusCode::OK,
            Json(ApiResponse::success(ConvertResponse {
                job_id: finished.id,
                status: finished.status,
                download_url: Some(download_url(finished.id)),
                message: None,
            })),
        )),
        JobStatus::Failed => Err(DocpressError::new(
            ErrorCode::RetriesExhausted,
            format!(
                "Conversion failed: {}",
                finished
                    .error_message
                    .as_deref()
                    .unwrap_or("unknown failure")
            ),
        )),
        status => Err(DocpressError::internal(format!(
            "job {} finished in unexpected state {}",
            finished.id, status
        ))),
    }
}

/// Pull the file and options out of the multipart body, staging the upload
/// on disk. Any error discards what was staged so far; rejected submissions
/// leave no trace.
async fn receive_upload(
    service: &ConvertService,
    mut multipart: Multipart,
) -> Result<(StagedUpload, Option<String>)> {
    let mut staged: Option<StagedUpload> = None;
    let mut convert_to: Option<String> = None;

    let outcome = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break Ok(()),
            Err(e) => {
                break Err(DocpressError::invalid_input(format!(
                    "Malformed multipart body: {}",
                    e
                )))
            }
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let Some(filename) = field.file_name().map(str::to_owned) else {
                    break Err(DocpressError::invalid_input("File field has no filename"));
                };
                let upload = match service.stage(&filename).await {
                    Ok(upload) => upload,
                    Err(e) => break Err(e),
                };
                if let Err(e) = save_field(field, &upload).await {
                    service.discard_staged(&upload).await;
                    break Err(e);
                }
                if let Some(old) = staged.replace(upload) {
                    service.discard_staged(&old).await;
                }
            }
            Some("convert_to") => match field.text().await {
                Ok(text) if !text.trim().is_empty() => {
                    convert_to = Some(text.trim().to_string());
                }
                Ok(_) => {}
                Err(e) => {
                    break Err(DocpressError::invalid_input(format!(
                        "Invalid convert_to field: {}",
                        e
                    )))
                }
            },
            _ => {}
        }
    };

    match outcome {
        Ok(()) => match staged {
            Some(staged) => {
                info!(
                    job_id = %staged.id,
                    file = %staged.input_path.display(),
                    convert_to = convert_to.as_deref().unwrap_or("pdf"),
                    "upload received"
                );
                Ok((staged, convert_to))
            }
            None => Err(DocpressError::invalid_input("Missing file field")),
        },
        Err(e) => {
            if let Some(staged) = staged {
                service.discard_staged(&staged).await;
            }
            Err(e)
        }
    }
}

/// Stream an upload field to the staged input path chunk by chunk.
async fn save_field(mut field: Field<'_>, upload: &StagedUpload) -> Result<()> {
    let mut file = tokio::fs::File::create(&upload.input_path).await?;
    loop {
        let chunk = field
            .chunk()
            .await
            .map_err(|e| DocpressError::invalid_input(format!("Upload stream error: {}", e)))?;
        match chunk {
            Some(chunk) => file.write_all(&chunk).await?,
            None => break,
        }
    }
    file.flush().await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status & Download
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// How many jobs are ahead of this one (only while queued)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl StatusResponse {
    fn from_job(job: Job, queue_position: Option<usize>) -> Self {
        let download_url = (job.status == JobStatus::Done && job.output_path.is_some())
            .then(|| download_url(job.id));
        Self {
            job_id: job.id,
            status: job.status,
            message: job.error_message,
            download_url,
            queue_position,
            retries: job.retries,
            max_retries: job.max_retries,
            created_at: job.created_at.to_rfc3339(),
            finished_at: job.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

fn download_url(id: JobId) -> String {
    format!("/api/v1/jobs/{}/download", id)
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let id = JobId::from(id);
    let job = state.service.job(id)?;

    let queue_position = (job.status == JobStatus::Queued)
        .then(|| state.service.queue_position(id))
        .flatten();

    Ok(Json(ApiResponse::success(StatusResponse::from_job(
        job,
        queue_position,
    ))))
}

pub async fn download_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let id = JobId::from(id);
    let path = state.service.artifact(id)?;

    let file = tokio::fs::File::open(&path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.pdf", id));
    let content_type = if filename.to_ascii_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    };

    info!(job_id = %id, path = %path.display(), "artifact download");

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// System Status
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn system_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.service.snapshot())))
}
