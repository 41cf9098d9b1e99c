//! API error types.
//!
//! The HTTP mapping follows who can act on the failure: 402 when the
//! owner needs more credits, 422 when the request itself must change,
//! 502 when the providers let us down. Every terminal generation error
//! carries an explicit statement about credit impact.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use gentask_models::FailureClass;
use gentask_orchestrator::OrchestratorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Orchestrator(e) => match e {
                OrchestratorError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
                OrchestratorError::UploadFailed(_) | OrchestratorError::NoProvider(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                OrchestratorError::GenerationFailed {
                    class: FailureClass::Rejected,
                    ..
                } => StatusCode::UNPROCESSABLE_ENTITY,
                OrchestratorError::GenerationFailed { .. } | OrchestratorError::Exhausted { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                OrchestratorError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    credits: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Orchestrator(OrchestratorError::Ledger(_)) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let (credits, task_id) = match &self {
            ApiError::Orchestrator(e) => (
                Some(e.credits_statement()),
                e.task_id().map(|id| id.to_string()),
            ),
            _ => (None, None),
        };

        let body = ErrorResponse {
            detail,
            credits,
            task_id,
        };

        (status, Json(body)).into_response()
    }
}
