//! Generation submission and status handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use gentask_models::{
    AspectRatio, GenerationKind, GenerationSpec, ImageSource, QualityTier, TaskId,
};
use gentask_orchestrator::TaskStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_PROMPT_LEN: usize = 4096;

/// Upper bound on requested duration (10 minutes); also keeps the credit
/// calculator well inside u32 range.
const MAX_DURATION_SECS: u32 = 600;

/// Generation submission request.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub kind: GenerationKind,
    pub prompt: String,
    pub image: Option<ImageSource>,
    pub duration_secs: Option<u32>,
    /// "W:H", e.g. "16:9"
    pub aspect_ratio: Option<String>,
    pub quality: Option<QualityTier>,
    #[serde(default)]
    pub watermark: bool,
    pub provider: Option<String>,
    /// true: await the result inline; false: return a task id immediately
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// Synchronous submission response.
#[derive(Serialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub state: &'static str,
    pub result_url: String,
    pub provider_used: String,
    pub credits_refunded: bool,
}

/// Fire-and-forget submission response.
#[derive(Serialize)]
pub struct AcceptedResponse {
    pub task_id: TaskId,
    pub pending: bool,
}

fn owner_from_headers(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("X-Owner-Id header required"))
}

fn build_spec(req: SubmitRequest) -> ApiResult<GenerationSpec> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    if req.prompt.len() > MAX_PROMPT_LEN {
        return Err(ApiError::bad_request("prompt too long"));
    }

    let mut spec = GenerationSpec::new(req.kind, req.prompt).with_watermark(req.watermark);

    if let Some(image) = req.image {
        spec = spec.with_image(image);
    }
    if let Some(secs) = req.duration_secs {
        if secs == 0 {
            return Err(ApiError::bad_request("duration_secs must be positive"));
        }
        if secs > MAX_DURATION_SECS {
            return Err(ApiError::bad_request(format!(
                "duration_secs must be at most {}",
                MAX_DURATION_SECS
            )));
        }
        spec = spec.with_duration_secs(secs);
    }
    if let Some(raw) = req.aspect_ratio {
        let aspect: AspectRatio = raw
            .parse()
            .map_err(|e| ApiError::bad_request(format!("{}", e)))?;
        spec = spec.with_aspect_ratio(aspect);
    }
    if let Some(quality) = req.quality {
        spec = spec.with_quality(quality);
    }
    if let Some(provider) = req.provider {
        spec = spec.with_provider_hint(provider);
    }

    Ok(spec)
}

/// Submit a generation request.
///
/// `wait: true` runs the whole task inline and returns the final result;
/// `wait: false` returns 202 with a task id to poll.
pub async fn submit_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Response> {
    let owner = owner_from_headers(&headers)?;
    let wait = req.wait;
    let spec = build_spec(req)?;

    if wait {
        let success = state.orchestrator.generate(&owner, spec).await?;
        let body = SubmitResponse {
            task_id: success.task_id,
            state: "succeeded",
            result_url: success.result_url,
            provider_used: success.provider_used,
            credits_refunded: false,
        };
        Ok(Json(body).into_response())
    } else {
        let task_id = state.orchestrator.generate_detached(&owner, spec).await?;
        let body = AcceptedResponse {
            task_id,
            pending: true,
        };
        Ok((StatusCode::ACCEPTED, Json(body)).into_response())
    }
}

/// Poll the status of a task by id. Works from any connection, not just
/// the one that submitted.
pub async fn get_generation(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatus>> {
    let status = state
        .orchestrator
        .status(&TaskId::from_string(task_id))
        .await?;
    Ok(Json(status))
}
