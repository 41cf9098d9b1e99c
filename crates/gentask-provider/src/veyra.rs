//! Veyra adapter (request/poll transport).
//!
//! Veyra is the primary video/image provider: a JSON "create job" call
//! followed by discrete status polls. No push channel exists; completion
//! is only observable by polling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gentask_models::{FailureClass, GenerationKind, GenerationSpec, ImageSource};

use crate::adapter::{GenerationProvider, JobHandle, PollStatus};
use crate::error::{ProviderError, ProviderResult};

pub const PROVIDER_NAME: &str = "veyra";

/// Veyra API client.
pub struct VeyraClient {
    base_url: String,
    api_key: String,
    client: Client,
}

/// Create-job request body.
#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    kind: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<u32>,
    aspect_ratio: String,
    quality: &'a str,
}

/// Create-job response body.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Status poll response body.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    error: Option<StatusError>,
}

#[derive(Debug, Deserialize)]
struct StatusError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl VeyraClient {
    /// Create a new client against the given endpoint.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// Create a client from `VEYRA_API_URL` / `VEYRA_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let base_url = std::env::var("VEYRA_API_URL")
            .unwrap_or_else(|_| "https://api.veyra.ai".to_string());
        let api_key = std::env::var("VEYRA_API_KEY")
            .map_err(|_| ProviderError::rejected("VEYRA_API_KEY not set"))?;
        Ok(Self::new(base_url, api_key))
    }

    /// Map a terminal failure reported by the provider to a failure class.
    ///
    /// Explicit error codes are used when present; an absent or unknown
    /// code is treated as transient so fallback still gets a chance.
    fn classify_failure(error: &StatusError) -> FailureClass {
        match error.code.as_deref() {
            Some("content_policy") | Some("invalid_input") | Some("unsupported") => {
                FailureClass::Rejected
            }
            _ => FailureClass::Unavailable,
        }
    }
}

#[async_trait]
impl GenerationProvider for VeyraClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        matches!(kind, GenerationKind::Video | GenerationKind::Image)
    }

    async fn submit(&self, spec: &GenerationSpec) -> ProviderResult<JobHandle> {
        let image_url = match &spec.image {
            Some(ImageSource::Reference { url }) => Some(url.as_str()),
            Some(ImageSource::Inline { .. }) => {
                // Media preparation resolves inline bytes before any
                // provider is contacted; reaching this point is a caller bug.
                return Err(ProviderError::rejected(
                    "inline image bytes were not resolved before submission",
                ));
            }
            None => None,
        };

        let request = CreateRequest {
            kind: spec.kind.as_str(),
            prompt: &spec.prompt,
            image_url,
            duration_secs: spec.duration_secs,
            aspect_ratio: spec.aspect_ratio.to_string(),
            quality: spec.quality.as_str(),
        };

        let url = format!("{}/v1/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unavailable(format!("malformed create response: {}", e)))?;

        match created.id {
            Some(id) if !id.is_empty() => {
                debug!(provider = PROVIDER_NAME, job_id = %id, "Submitted generation job");
                Ok(JobHandle::new(PROVIDER_NAME, id))
            }
            // Submission "succeeded" but nothing to poll; never retry a
            // poll against an empty handle.
            _ => Err(ProviderError::rejected(
                "submission accepted but no job id returned",
            )),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let url = format!("{}/v1/generations/{}", self.base_url, handle.job_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unavailable(format!("malformed status response: {}", e)))?;

        match status.status.as_str() {
            "queued" | "processing" | "running" => Ok(PollStatus::Running),
            "succeeded" | "completed" => {
                match status.video_url.or(status.image_url) {
                    Some(result_url) if !result_url.is_empty() => {
                        Ok(PollStatus::Succeeded { result_url })
                    }
                    // Terminal marker without a result asset; keep polling
                    // so the attempt budget bounds worst-case behavior.
                    _ => {
                        warn!(
                            provider = PROVIDER_NAME,
                            job_id = %handle.job_id,
                            "Terminal status without result URL, treating as running"
                        );
                        Ok(PollStatus::Running)
                    }
                }
            }
            "failed" | "error" => {
                let (class, reason) = match &status.error {
                    Some(err) => (
                        Self::classify_failure(err),
                        err.message.clone().unwrap_or_else(|| "generation failed".to_string()),
                    ),
                    None => (FailureClass::Unavailable, "generation failed".to_string()),
                };
                Ok(PollStatus::Failed { class, reason })
            }
            other => {
                warn!(
                    provider = PROVIDER_NAME,
                    job_id = %handle.job_id,
                    status = other,
                    "Unrecognized job status, treating as running"
                );
                Ok(PollStatus::Running)
            }
        }
    }
}
