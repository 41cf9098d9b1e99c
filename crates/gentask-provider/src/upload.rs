//! Media upload collaborator.
//!
//! Providers only consume hosted URLs, so user-supplied inline image
//! bytes must be turned into a reference first. The hosting service is
//! external; this module only defines the seam and its HTTP
//! implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub type UploadResult<T> = Result<T, UploadError>;

/// Upload failure. Always raised before any credits are reserved or any
/// provider is contacted.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    Failed(String),
}

impl UploadError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// `upload(bytes) -> URL` against the external asset host.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> UploadResult<String>;
}

/// HTTP multipart uploader.
pub struct HttpUploader {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Create an uploader from `ASSET_UPLOAD_URL`.
    pub fn from_env() -> UploadResult<Self> {
        let base_url = std::env::var("ASSET_UPLOAD_URL")
            .map_err(|_| UploadError::failed("ASSET_UPLOAD_URL not set"))?;
        Ok(Self::new(base_url))
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> UploadResult<String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("image")
            .mime_str(mime_type)
            .map_err(|e| UploadError::failed(format!("invalid mime type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/upload", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            return Err(UploadError::failed(format!(
                "upload returned {}",
                response.status()
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::failed(format!("malformed upload response: {}", e)))?;

        if uploaded.url.is_empty() {
            return Err(UploadError::failed("upload returned an empty URL"));
        }

        debug!(url = %uploaded.url, "Uploaded inline image");
        Ok(uploaded.url)
    }
}
