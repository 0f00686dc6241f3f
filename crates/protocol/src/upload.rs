//! Two-phase image upload.
//!
//! Phase one declares the byte length and filename against the upload
//! endpoint and receives a single-use upload URL in a response header.
//! Phase two posts the raw bytes to that URL with a finalize command; the
//! response body is the remote reference string used inside a turn
//! payload. A failed upload fails the enclosing turn; there are no
//! retries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use shared::{ImageAttachment, TurnError};
use tokio_util::sync::CancellationToken;

use crate::config::WireConfig;

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Seam for media upload, injectable for engine tests.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Returns the remote reference usable inside a turn payload.
    async fn upload(
        &self,
        image: &ImageAttachment,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError>;
}

/// Production uploader speaking the resumable-upload sub-protocol.
pub struct GoogleUploader {
    http: Client,
    config: Arc<WireConfig>,
}

impl GoogleUploader {
    pub fn new(config: Arc<WireConfig>) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(120)).build()?,
            config,
        })
    }

    async fn initiate(&self, image: &ImageAttachment) -> Result<String, TurnError> {
        // The init body carries the filename as a bare form key.
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(&format!("File name: {}", image.name), "")
            .finish();

        let resp = self
            .http
            .post(&self.config.upload_endpoint)
            .header(
                "content-type",
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .header("push-id", &self.config.upload_push_id)
            .header("x-tenant-id", &self.config.upload_tenant)
            .header("x-goog-upload-protocol", "resumable")
            .header(
                "x-goog-upload-header-content-length",
                image.data.len().to_string(),
            )
            .header("x-goog-upload-command", "start")
            .body(body)
            .send()
            .await
            .map_err(|e| TurnError::UploadInit(e.to_string()))?;

        resp.headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| TurnError::UploadInit("no upload URL in init response".to_string()))
    }

    async fn transfer(&self, upload_url: &str, image: &ImageAttachment) -> Result<String, TurnError> {
        let resp = self
            .http
            .post(upload_url)
            .header("push-id", &self.config.upload_push_id)
            .header("x-tenant-id", &self.config.upload_tenant)
            .header("x-goog-upload-protocol", "resumable")
            .header("x-goog-upload-command", "upload, finalize")
            .header("x-goog-upload-offset", "0")
            .body(image.data.clone())
            .send()
            .await
            .map_err(|e| TurnError::UploadTransfer(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TurnError::UploadTransfer(format!(
                "upload returned {}",
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| TurnError::UploadTransfer(e.to_string()))
    }
}

#[async_trait]
impl MediaUploader for GoogleUploader {
    async fn upload(
        &self,
        image: &ImageAttachment,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let run = async {
            let upload_url = self.initiate(image).await?;
            tracing::debug!(name = %image.name, bytes = image.data.len(), "upload initiated");
            let remote_ref = self.transfer(&upload_url, image).await?;
            tracing::debug!(name = %image.name, "upload finalized");
            Ok(remote_ref)
        };

        // Both phases observe the same signal; cancelling mid-phase aborts
        // the network call and surfaces as Cancelled, not an upload error.
        tokio::select! {
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = run => result,
        }
    }
}
