//! Crate-wide error type and HTTP error responses.
//!
//! Every fallible operation returns [`DocpressError`], which carries a stable
//! machine-readable [`ErrorCode`], a message safe to show to clients, and an
//! optional internal detail that only reaches the logs. Handlers bubble
//! errors up with `?`; the `IntoResponse` impl logs the error and maps it
//! onto the right status code and JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

pub type Result<T> = std::result::Result<T, DocpressError>;

/// Stable error codes exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Admission rejected; no job was created
    QueueFull,
    /// Unknown or already-evicted job identifier
    JobNotFound,
    /// Download requested before `done` or after `cleaned`
    ArtifactUnavailable,
    /// A status change violated the job state machine
    InvalidStateTransition,
    /// Converter exited non-zero or produced no artifact
    ConversionFailed,
    /// Converter exceeded the wall-clock timeout and was killed
    ConversionTimeout,
    /// Terminal failure after the retry budget was spent
    RetriesExhausted,
    /// Filesystem fault while staging, converting, or cleaning up
    StorageError,
    /// Malformed submission (missing file field, bad multipart body)
    InvalidInput,
    /// Anything that should not happen
    InternalError,
}

impl ErrorCode {
    /// HTTP status this code maps to.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            Self::JobNotFound => StatusCode::NOT_FOUND,
            Self::ArtifactUnavailable | Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::InvalidStateTransition => StatusCode::CONFLICT,
            Self::ConversionTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ConversionFailed
            | Self::RetriesExhausted
            | Self::StorageError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether another conversion attempt may succeed after this error.
    ///
    /// The retry supervisor recovers retryable errors locally up to the retry
    /// budget; everything else surfaces to the caller immediately.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConversionFailed | Self::ConversionTimeout | Self::StorageError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Service error: a code, a client-safe message, and log-only detail.
#[derive(Error, Debug)]
pub struct DocpressError {
    code: ErrorCode,
    message: Cow<'static, str>,
    /// Never serialized into responses
    detail: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for DocpressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl DocpressError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        counter!("docpress_errors_total", "code" => code.to_string()).increment(1);
        Self {
            code,
            message: message.into(),
            detail: None,
            source: None,
        }
    }

    /// An error whose internal detail must not reach the client.
    pub fn detailed(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        let mut err = Self::new(code, message);
        err.detail = Some(detail.into());
        err
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::detailed(ErrorCode::InternalError, "An internal error occurred", detail)
    }

    pub fn job_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", id))
    }

    pub fn queue_full(limit: usize) -> Self {
        Self::new(
            ErrorCode::QueueFull,
            format!("Conversion queue is full (limit {})", limit),
        )
    }

    pub fn artifact_unavailable(id: impl fmt::Display, status: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ArtifactUnavailable,
            format!("No downloadable artifact for job {} (status: {})", id, status),
        )
    }

    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Attach the error that caused this one.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Log at a level matching how alarming the error is: client mistakes
    /// are debug noise, conversion trouble is expected operational churn,
    /// storage and internal faults need attention.
    fn log(&self) {
        match self.code {
            ErrorCode::StorageError | ErrorCode::InternalError => error!(
                code = %self.code,
                message = %self.message,
                detail = ?self.detail,
                source = ?self.source,
                "request failed"
            ),
            ErrorCode::ConversionFailed
            | ErrorCode::ConversionTimeout
            | ErrorCode::RetriesExhausted
            | ErrorCode::InvalidStateTransition => warn!(
                code = %self.code,
                message = %self.message,
                detail = ?self.detail,
                "request failed"
            ),
            _ => debug!(code = %self.code, message = %self.message, "request rejected"),
        }
    }
}

/// JSON body returned for failed requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&DocpressError> for ErrorResponse {
    fn from(err: &DocpressError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: err.code,
                message: err.message.to_string(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for DocpressError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<std::io::Error> for DocpressError {
    fn from(err: std::io::Error) -> Self {
        let message = match err.kind() {
            std::io::ErrorKind::NotFound => "File or resource not found",
            std::io::ErrorKind::PermissionDenied => "Permission denied",
            _ => "An I/O error occurred",
        };
        Self::detailed(ErrorCode::StorageError, message, err.to_string()).with_source(err)
    }
}

impl From<tokio::sync::AcquireError> for DocpressError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        // Only possible if the worker semaphore is closed, which we never do.
        Self::internal(format!("worker slot acquisition failed: {}", err)).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::QueueFull.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::ConversionTimeout.http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ErrorCode::ArtifactUnavailable.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::RetriesExhausted.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryability() {
        assert!(ErrorCode::ConversionFailed.is_retryable());
        assert!(ErrorCode::ConversionTimeout.is_retryable());
        assert!(ErrorCode::StorageError.is_retryable());
        assert!(!ErrorCode::QueueFull.is_retryable());
        assert!(!ErrorCode::JobNotFound.is_retryable());
        assert!(!ErrorCode::RetriesExhausted.is_retryable());
    }

    #[test]
    fn test_constructors() {
        let err = DocpressError::queue_full(1000);
        assert_eq!(err.code(), ErrorCode::QueueFull);
        assert!(err.message().contains("1000"));

        let err = DocpressError::job_not_found(uuid::Uuid::new_v4());
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_detail_stays_out_of_the_response() {
        let err = DocpressError::detailed(
            ErrorCode::ConversionFailed,
            "Conversion failed",
            "soffice exited with code 77",
        );

        let json = serde_json::to_string(&ErrorResponse::from(&err)).unwrap();
        assert!(json.contains("CONVERSION_FAILED"));
        assert!(json.contains("Conversion failed"));
        assert!(!json.contains("code 77"));

        // The Display form carries the detail for logging.
        assert!(format!("{}", err).contains("code 77"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = DocpressError::from(io);
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert!(std::error::Error::source(&err).is_some());
    }
}
