//! Single-shot HTTP result delivery.
//!
//! [`CallbackDelivery`] POSTs a finished job's result to the consumer URL
//! recorded at submission. Every method makes exactly one attempt: a
//! refused or non-2xx response is reported to the caller, logged there,
//! and never retried. Consumers that miss a callback re-fetch the job by
//! id instead.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::artifact::mime_for_extension;
use crate::error::DeliveryError;

/// HTTP request timeout for one delivery attempt. Generous because the
/// binary format uploads whole renders to consumers on slow links.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// CallbackDelivery
// ---------------------------------------------------------------------------

/// Delivers job results to external callback endpoints.
pub struct CallbackDelivery {
    client: reqwest::Client,
}

impl CallbackDelivery {
    /// Create a new delivery service with a pre-configured HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// POST `{"filePath": ...}` referencing an artifact the consumer can
    /// reach on a shared filesystem.
    pub async fn send_file_path(&self, url: &str, artifact: &Path) -> Result<(), DeliveryError> {
        self.post_json(url, &file_path_body(artifact)).await
    }

    /// POST the artifact bytes as a multipart form with a single `file`
    /// part, named after the artifact and typed from its extension.
    pub async fn send_binary(&self, url: &str, artifact: &Path) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(artifact).await?;
        let filename = display_name(artifact);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime_for_extension(artifact))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self.client.post(url).multipart(form).send().await?;
        ensure_success(&response)
    }

    /// POST the artifact inline as `{"filename", "data", "mimeType"}`
    /// with base64-encoded bytes, for consumers that cannot accept
    /// multipart uploads.
    pub async fn send_base64(&self, url: &str, artifact: &Path) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(artifact).await?;
        let body = base64_body(&display_name(artifact), mime_for_extension(artifact), &bytes);
        self.post_json(url, &body).await
    }

    /// POST `{"error": ...}` for a failed job.
    pub async fn send_failure(&self, url: &str, detail: &str) -> Result<(), DeliveryError> {
        self.post_json(url, &failure_body(detail)).await
    }

    /// Execute a single JSON POST and check the response status.
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let response = self.client.post(url).json(payload).send().await?;
        ensure_success(&response)
    }
}

impl Default for CallbackDelivery {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_success(response: &reqwest::Response) -> Result<(), DeliveryError> {
    if !response.status().is_success() {
        return Err(DeliveryError::HttpStatus(response.status().as_u16()));
    }
    Ok(())
}

fn display_name(artifact: &Path) -> String {
    artifact
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact")
        .to_string()
}

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

fn file_path_body(artifact: &Path) -> serde_json::Value {
    serde_json::json!({ "filePath": artifact.display().to_string() })
}

fn failure_body(detail: &str) -> serde_json::Value {
    serde_json::json!({ "error": detail })
}

fn base64_body(filename: &str, mime: &str, bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "filename": filename,
        "data": STANDARD.encode(bytes),
        "mimeType": mime,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
