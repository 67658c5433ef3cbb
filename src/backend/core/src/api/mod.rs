//! REST API for the conversion service.
//!
//! # Endpoints
//!
//! Unauthenticated:
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus metrics
//!
//! Behind the API key (`X-API-Key`), under `/api/v1`:
//! - `POST /api/v1/convert` - Submit a document (async, returns immediately)
//! - `POST /api/v1/convert/sync` - Submit and block until terminal
//! - `GET  /api/v1/jobs/:id` - Job status
//! - `GET  /api/v1/jobs/:id/download` - Download the artifact
//! - `GET  /api/v1/system/status` - Aggregate system status

pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::jobs::ConvertService;
use crate::middleware::ApiKeyLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConvertService>,
}

/// Build the API router.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/convert", post(handlers::convert_async))
        .route("/convert/sync", post(handlers::convert_sync))
        .route("/jobs/:id", get(handlers::job_status))
        .route("/jobs/:id/download", get(handlers::download_artifact))
        .route("/system/status", get(handlers::system_status))
        .layer(ApiKeyLayer::new(&config.auth.api_key))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes));

    Router::new()
        // Unversioned endpoints (health, metrics)
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Envelope for successful JSON payloads.
///
/// Failed requests never pass through here; they are rendered by the
/// `IntoResponse` impl on [`crate::error::DocpressError`].
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_shape() {
        let json = serde_json::to_string(&ApiResponse::success("payload")).unwrap();
        assert_eq!(json, r#"{"success":true,"data":"payload"}"#);
    }
}
