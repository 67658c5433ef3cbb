//! API key authentication middleware.
//!
//! Validates the `X-API-Key` header against the single configured key. The
//! layer wraps only the protected routes; health and metrics stay open. An
//! empty configured key disables the check entirely (development mode).
//!
//! # Example
//!
//! ```rust,ignore
//! use docpress_core::middleware::ApiKeyLayer;
//!
//! let app = Router::new()
//!     .nest("/api/v1", api_routes)
//!     .layer(ApiKeyLayer::new("secret-key"));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use metrics::counter;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::debug;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            Self::MissingApiKey => ("MISSING_API_KEY", "The X-API-Key header is required"),
            Self::InvalidApiKey => ("INVALID_API_KEY", "The provided API key is invalid"),
        };

        counter!(
            "docpress_auth_errors_total",
            "error_type" => code.to_string()
        )
        .increment(1);

        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        });

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Layer applying API key authentication.
#[derive(Clone)]
pub struct ApiKeyLayer {
    /// `None` disables authentication.
    key: Option<Arc<str>>,
}

impl ApiKeyLayer {
    /// Create a layer for the configured key; an empty key disables auth.
    pub fn new(key: &str) -> Self {
        Self {
            key: if key.is_empty() {
                None
            } else {
                Some(Arc::from(key))
            },
        }
    }

    /// Whether requests are actually checked.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKeyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyService {
            inner,
            key: self.key.clone(),
        }
    }
}

/// Service wrapper enforcing the API key.
#[derive(Clone)]
pub struct ApiKeyService<S> {
    inner: S,
    key: Option<Arc<str>>,
}

impl<S> Service<Request<Body>> for ApiKeyService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let Some(expected) = self.key.clone() else {
            let future = self.inner.call(request);
            return Box::pin(future);
        };

        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        match provided {
            Some(key) if key == *expected => {
                let future = self.inner.call(request);
                Box::pin(future)
            }
            Some(_) => {
                debug!(path = %request.uri().path(), "rejected request with invalid API key");
                Box::pin(async move { Ok(AuthError::InvalidApiKey.into_response()) })
            }
            None => {
                debug!(path = %request.uri().path(), "rejected request without API key");
                Box::pin(async move { Ok(AuthError::MissingApiKey.into_response()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(key: &str) -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(ApiKeyLayer::new(key))
    }

    fn request(key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/protected");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_key_passes() {
        let response = app("secret").oneshot(request(Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let response = app("secret").oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let response = app("secret").oneshot(request(Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_key_disables_auth() {
        let layer = ApiKeyLayer::new("");
        assert!(!layer.is_enabled());

        let response = app("").oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
