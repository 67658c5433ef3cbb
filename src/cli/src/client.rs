//! Thin client for the docpress REST API.
//!
//! Payload-bearing endpoints wrap their bodies in the server's response
//! envelope; this module unwraps it and turns transport faults, non-2xx
//! statuses, and envelope errors into `anyhow` errors the commands print
//! directly.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

/// Response envelope shared by all JSON endpoints.
#[derive(Debug, serde::Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    /// Build a client for the given server.
    ///
    /// The API key, when present, rides along on every request as a default
    /// header. No request timeout is set: synchronous conversions can
    /// legitimately run for minutes.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value =
                HeaderValue::from_str(&key).context("API key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert("X-API-Key", value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET an envelope-wrapped payload.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        unwrap_envelope(ensure_ok(resp).await?, &url).await
    }

    /// POST a multipart form and unwrap the envelope payload.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        unwrap_envelope(ensure_ok(resp).await?, &url).await
    }

    /// GET a bare JSON document; the health endpoint carries no envelope.
    pub async fn get_value(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        ensure_ok(resp)
            .await?
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", url))
    }

    /// GET a binary body (artifact downloads).
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let bytes = ensure_ok(resp)
            .await?
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// Reject non-2xx responses, preferring the server's JSON error message over
/// the raw body when one can be extracted.
async fn ensure_ok(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            // Either the structured error body or the flat envelope form.
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_owned))
        })
        .unwrap_or(body);
    bail!("server returned {}: {}", status, message);
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: Response, url: &str) -> Result<T> {
    let envelope: Envelope<T> = resp
        .json()
        .await
        .with_context(|| format!("Malformed response from {}", url))?;

    if !envelope.success {
        let reason = envelope
            .error
            .unwrap_or_else(|| "unspecified server error".to_string());
        return Err(anyhow!("{}", reason));
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("Server reported success without a payload"))
}
