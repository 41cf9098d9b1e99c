//! The provider adapter contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gentask_models::{FailureClass, GenerationKind, GenerationSpec};

use crate::error::ProviderResult;

/// Opaque provider-assigned job identifier plus the adapter that issued it.
///
/// Lives for exactly one provider attempt and is never reused across
/// providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Adapter name that issued this handle
    pub provider: String,
    /// Provider-assigned identifier, never empty
    pub job_id: String,
}

impl JobHandle {
    pub fn new(provider: impl Into<String>, job_id: impl Into<String>) -> Self {
        let handle = Self {
            provider: provider.into(),
            job_id: job_id.into(),
        };
        debug_assert!(!handle.job_id.is_empty(), "job handle requires a job id");
        handle
    }
}

/// Observed status of a provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Job accepted, no terminal status yet
    Running,
    /// Provider produced a result asset
    Succeeded { result_url: String },
    /// Provider reported a terminal failure
    Failed { class: FailureClass, reason: String },
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Running)
    }
}

/// Uniform capability over one external generation service.
///
/// `poll` must be an idempotent observation: calling it repeatedly on an
/// already-terminal handle returns the same terminal status and triggers
/// no side effects beyond the provider's own bookkeeping.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable adapter name, used in chains, attempts and logs.
    fn name(&self) -> &str;

    /// Whether this provider can handle the given kind.
    fn supports(&self, kind: GenerationKind) -> bool;

    /// Submit a generation job.
    ///
    /// "Submission succeeded but no job identifier returned" must be
    /// reported as `ProviderError::Rejected`; callers never poll an
    /// empty handle.
    async fn submit(&self, spec: &GenerationSpec) -> ProviderResult<JobHandle>;

    /// Observe the current status of a submitted job.
    async fn poll(&self, handle: &JobHandle) -> ProviderResult<PollStatus>;
}
