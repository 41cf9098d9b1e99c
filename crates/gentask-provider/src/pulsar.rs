//! Pulsar adapter (chunked streaming transport).
//!
//! Pulsar is the fallback video provider. Instead of discrete status
//! polls it emits a chunked stream of line-delimited JSON events. The
//! adapter hides this: `submit` reads the stream only far enough to learn
//! the server-assigned task id, and `poll` replays the event log and
//! reduces it to the same three-way [`PollStatus`] every other adapter
//! emits. Unrecognized terminal-looking events are reported as `Running`
//! so the caller's attempt budget bounds worst-case behavior instead of
//! the adapter hanging forever.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gentask_models::{FailureClass, GenerationKind, GenerationSpec, ImageSource};

use crate::adapter::{GenerationProvider, JobHandle, PollStatus};
use crate::error::{ProviderError, ProviderResult};

pub const PROVIDER_NAME: &str = "pulsar";

/// Upper bound on stream bytes consumed while looking for the task id.
const MAX_SUBMIT_STREAM_BYTES: usize = 64 * 1024;

/// Pulsar API client.
pub struct PulsarClient {
    base_url: String,
    api_key: String,
    client: Client,
}

/// Generate request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    aspect_ratio: String,
    /// Pulsar watermarks output unless explicitly disabled; the spec's
    /// user preference is encoded here.
    watermark: bool,
}

/// One event in the Pulsar stream.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_class: Option<String>,
}

impl PulsarClient {
    /// Create a new client against the given endpoint.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// Create a client from `PULSAR_API_URL` / `PULSAR_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let base_url = std::env::var("PULSAR_API_URL")
            .unwrap_or_else(|_| "https://api.pulsar.video".to_string());
        let api_key = std::env::var("PULSAR_API_KEY")
            .map_err(|_| ProviderError::rejected("PULSAR_API_KEY not set"))?;
        Ok(Self::new(base_url, api_key))
    }

    /// Reduce the replayed event log to a single status.
    ///
    /// Events are scanned in order; the last recognizable terminal event
    /// wins. Anything else (partial lines, progress events, markers we do
    /// not recognize) leaves the job Running.
    fn reduce_events(body: &str, job_id: &str) -> PollStatus {
        let mut status = PollStatus::Running;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: StreamEvent = match serde_json::from_str(line) {
                Ok(e) => e,
                Err(_) => continue,
            };

            match event.status.as_deref() {
                Some("succeeded") | Some("done") => match event.url {
                    Some(url) if !url.is_empty() => {
                        status = PollStatus::Succeeded { result_url: url };
                    }
                    _ => {
                        warn!(
                            provider = PROVIDER_NAME,
                            job_id,
                            "Success event without result URL, treating as running"
                        );
                    }
                },
                Some("failed") => {
                    let class = match event.error_class.as_deref() {
                        Some("rejected") => FailureClass::Rejected,
                        _ => FailureClass::Unavailable,
                    };
                    status = PollStatus::Failed {
                        class,
                        reason: event
                            .error
                            .unwrap_or_else(|| "generation failed".to_string()),
                    };
                }
                // Progress/heartbeat events and unknown markers
                _ => {}
            }
        }

        status
    }
}

#[async_trait]
impl GenerationProvider for PulsarClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        matches!(kind, GenerationKind::Video)
    }

    async fn submit(&self, spec: &GenerationSpec) -> ProviderResult<JobHandle> {
        let image_url = match &spec.image {
            Some(ImageSource::Reference { url }) => Some(url.as_str()),
            Some(ImageSource::Inline { .. }) => {
                return Err(ProviderError::rejected(
                    "inline image bytes were not resolved before submission",
                ));
            }
            None => None,
        };

        let request = GenerateRequest {
            prompt: &spec.prompt,
            image_url,
            duration: spec.duration_secs,
            aspect_ratio: spec.aspect_ratio.to_string(),
            watermark: spec.watermark,
        };

        let url = format!("{}/api/generate", self.base_url);
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

        // Read the chunked stream only until the task id shows up.
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for line in buffer.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Ok(event) = serde_json::from_str::<StreamEvent>(line) {
                    if let Some(task) = event.task.filter(|t| !t.is_empty()) {
                        debug!(provider = PROVIDER_NAME, job_id = %task, "Submitted generation job");
                        return Ok(JobHandle::new(PROVIDER_NAME, task));
                    }
                }
            }

            if buffer.len() > MAX_SUBMIT_STREAM_BYTES {
                break;
            }
        }

        // Stream ended (or exceeded the scan budget) without a task id
        Err(ProviderError::rejected(
            "submission accepted but no task id in response stream",
        ))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus> {
        let url = format!("{}/api/tasks/{}", self.base_url, handle.job_id);
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

        let body = response.text().await?;
        Ok(Self::reduce_events(&body, &handle.job_id))
    }
}
