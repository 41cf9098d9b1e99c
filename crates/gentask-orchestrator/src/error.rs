//! Orchestrator error types.
//!
//! The taxonomy mirrors what callers need to act on: whether the failure
//! is their own to fix, whether the system gave up, and above all whether
//! credits were affected. Silent credit loss is the most severe class of
//! bug this subsystem can have, so every terminal error states it.

use thiserror::Error;

use gentask_ledger::LedgerError;
use gentask_models::{FailureClass, TaskId};

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Balance below the reserve amount. No reservation was made.
    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    /// Inline image could not be uploaded. Raised before any reservation
    /// or provider call; an unresolved image makes every attempt pointless.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// No configured provider supports the requested kind.
    #[error("No provider available for {0}")]
    NoProvider(String),

    /// The attempt ended terminally and the chain was not continued
    /// (provider rejected the request itself).
    #[error("Generation failed: {reason}")]
    GenerationFailed {
        task_id: TaskId,
        class: FailureClass,
        reason: String,
        credits_refunded: bool,
    },

    /// The whole fallback chain was tried and failed. A normal failure,
    /// not a system error.
    #[error("All providers failed: {reason}")]
    Exhausted {
        task_id: TaskId,
        reason: String,
        credits_refunded: bool,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl OrchestratorError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    /// The task id a terminal failure belongs to, when one was created.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            OrchestratorError::GenerationFailed { task_id, .. }
            | OrchestratorError::Exhausted { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Explicit statement about credit impact, surfaced verbatim to users.
    pub fn credits_statement(&self) -> &'static str {
        match self {
            OrchestratorError::InsufficientCredits { .. }
            | OrchestratorError::UploadFailed(_)
            | OrchestratorError::NoProvider(_) => "no credits were charged",
            OrchestratorError::GenerationFailed {
                credits_refunded: true,
                ..
            }
            | OrchestratorError::Exhausted {
                credits_refunded: true,
                ..
            } => "reserved credits were refunded",
            OrchestratorError::GenerationFailed { .. } | OrchestratorError::Exhausted { .. } => {
                "credit refund is pending reconciliation"
            }
            OrchestratorError::TaskNotFound(_) | OrchestratorError::Ledger(_) => {
                "credits were not affected by this request"
            }
        }
    }
}
