//! Task state machine.
//!
//! Drives one generation attempt through Submitting -> Polling ->
//! terminal. Every transition is persisted to the task store before being
//! acted upon further, so a crash between "provider said Succeeded" and
//! "debit confirmed" is recoverable by re-polling: providers keep
//! returning the same terminal status for a finished job.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gentask_ledger::TaskStore;
use gentask_models::{FailureClass, TaskRecord};
use gentask_provider::{GenerationProvider, JobHandle, PollStatus, ProviderError};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::metrics;

/// Terminal summary of one attempt, handed to the fallback coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcomeSummary {
    Succeeded { result_url: String },
    Failed { class: FailureClass, reason: String },
}

/// Runs attempts against providers and persists every transition.
#[derive(Clone)]
pub struct TaskStateMachine {
    store: Arc<dyn TaskStore>,
    config: OrchestratorConfig,
}

impl TaskStateMachine {
    pub fn new(store: Arc<dyn TaskStore>, config: OrchestratorConfig) -> Self {
        Self { store, config }
    }

    /// Run one full attempt: submit, then poll to a terminal outcome.
    pub async fn run_attempt(
        &self,
        provider: &dyn GenerationProvider,
        record: &mut TaskRecord,
    ) -> OrchestratorResult<AttemptOutcomeSummary> {
        record.begin_attempt(provider.name());
        self.store.update(record).await?;

        let handle = match provider.submit(&record.spec).await {
            Ok(handle) => handle,
            Err(e) => {
                let class = e.failure_class();
                let reason = e.to_string();
                warn!(
                    task_id = %record.id,
                    provider = provider.name(),
                    class = %class,
                    "Submit failed: {}", reason
                );
                record.attempt_failed(class, &reason);
                self.store.update(record).await?;
                metrics::record_attempt(provider.name(), "submit_failed");
                return Ok(AttemptOutcomeSummary::Failed { class, reason });
            }
        };

        info!(
            task_id = %record.id,
            provider = provider.name(),
            job_id = %handle.job_id,
            "Job submitted, polling"
        );
        record.attempt_submitted(&handle.job_id);
        self.store.update(record).await?;

        self.poll_to_terminal(provider, record, &handle).await
    }

    /// Poll a live handle until the provider reports a terminal status or
    /// the attempt budget runs out (a synthesized `Timeout`).
    ///
    /// Also the resume path after a restart: a recovered record with a
    /// live handle re-enters here directly.
    pub async fn poll_to_terminal(
        &self,
        provider: &dyn GenerationProvider,
        record: &mut TaskRecord,
        handle: &JobHandle,
    ) -> OrchestratorResult<AttemptOutcomeSummary> {
        for poll in 0..self.config.max_poll_attempts {
            metrics::record_poll(provider.name());

            match provider.poll(handle).await {
                Ok(PollStatus::Running) => {
                    debug!(
                        task_id = %record.id,
                        provider = provider.name(),
                        poll = poll + 1,
                        "Job still running"
                    );
                }
                Ok(PollStatus::Succeeded { result_url }) => {
                    record.complete(&result_url);
                    self.store.update(record).await?;
                    metrics::record_attempt(provider.name(), "succeeded");
                    info!(
                        task_id = %record.id,
                        provider = provider.name(),
                        result_url = %result_url,
                        "Job succeeded"
                    );
                    return Ok(AttemptOutcomeSummary::Succeeded { result_url });
                }
                Ok(PollStatus::Failed { class, reason }) => {
                    record.attempt_failed(class, &reason);
                    self.store.update(record).await?;
                    metrics::record_attempt(provider.name(), "failed");
                    warn!(
                        task_id = %record.id,
                        provider = provider.name(),
                        class = %class,
                        "Job failed: {}", reason
                    );
                    return Ok(AttemptOutcomeSummary::Failed { class, reason });
                }
                Err(e @ ProviderError::Rejected(_)) => {
                    // The provider no longer recognizes the job; nothing
                    // to keep polling.
                    let reason = e.to_string();
                    record.attempt_failed(FailureClass::Rejected, &reason);
                    self.store.update(record).await?;
                    metrics::record_attempt(provider.name(), "failed");
                    return Ok(AttemptOutcomeSummary::Failed {
                        class: FailureClass::Rejected,
                        reason,
                    });
                }
                Err(e) => {
                    // Transient poll error; counts against the budget
                    debug!(
                        task_id = %record.id,
                        provider = provider.name(),
                        poll = poll + 1,
                        "Poll error: {}", e
                    );
                }
            }

            // No sleep after the final budgeted poll; the synthesized
            // timeout should not wait one more interval.
            if poll + 1 < self.config.max_poll_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        // Budget exhausted with no terminal provider status
        let reason = format!(
            "no terminal status after {} polls",
            self.config.max_poll_attempts
        );
        record.attempt_failed(FailureClass::Timeout, &reason);
        self.store.update(record).await?;
        metrics::record_attempt(provider.name(), "timeout");
        warn!(
            task_id = %record.id,
            provider = provider.name(),
            "Attempt timed out: {}", reason
        );
        Ok(AttemptOutcomeSummary::Failed {
            class: FailureClass::Timeout,
            reason,
        })
    }
}
