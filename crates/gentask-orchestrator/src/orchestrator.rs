//! The orchestrator façade.
//!
//! Ties reservation, media preparation, the fallback plan, the state
//! machine and reconciliation into the two operating modes:
//!
//! - synchronous: the caller awaits the whole run and gets the final
//!   result or failure directly;
//! - fire-and-forget: the caller gets a task id immediately and the run
//!   continues on a detached task, decoupled from the caller's
//!   connection lifetime.
//!
//! A disconnecting synchronous caller does not cancel the run; the task
//! and its reservation continue to their natural terminal state so
//! credits reconcile correctly and a later status check still resolves.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use gentask_ledger::{CreditLedger, RetentionPolicy, TaskStore};
use gentask_models::{FailureClass, GenerationSpec, TaskId, TaskRecord, TaskState};
use gentask_provider::{JobHandle, MediaUploader};

use crate::chain::FallbackChains;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::machine::{AttemptOutcomeSummary, TaskStateMachine};
use crate::media;
use crate::metrics;
use crate::reconciler::CreditReconciler;

/// Successful generation outcome (synchronous mode).
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSuccess {
    pub task_id: TaskId,
    pub result_url: String,
    pub provider_used: String,
}

/// Status projection for out-of-band polling.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts_tried: usize,
    pub credits_refunded: bool,
}

impl From<&TaskRecord> for TaskStatus {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id.clone(),
            state: record.state,
            result_url: record.result_url.clone(),
            error: record.last_error.clone(),
            attempts_tried: record.attempts_tried(),
            credits_refunded: record.credits_refunded,
        }
    }
}

/// The generation task orchestrator.
pub struct Orchestrator {
    chains: FallbackChains,
    store: Arc<dyn TaskStore>,
    uploader: Arc<dyn MediaUploader>,
    reconciler: CreditReconciler,
    machine: TaskStateMachine,
    config: OrchestratorConfig,
    /// Per-provider concurrency limits (counting semaphores)
    semaphores: HashMap<String, Arc<Semaphore>>,
}

impl Orchestrator {
    pub fn new(
        chains: FallbackChains,
        ledger: Arc<dyn CreditLedger>,
        store: Arc<dyn TaskStore>,
        uploader: Arc<dyn MediaUploader>,
        config: OrchestratorConfig,
    ) -> Self {
        let semaphores = chains
            .providers()
            .iter()
            .map(|p| {
                (
                    p.name().to_string(),
                    Arc::new(Semaphore::new(config.max_concurrent_per_provider)),
                )
            })
            .collect();

        Self {
            chains,
            store: store.clone(),
            uploader,
            reconciler: CreditReconciler::new(ledger),
            machine: TaskStateMachine::new(store, config.clone()),
            config,
            semaphores,
        }
    }

    /// Synchronous mode: run the whole task and return the final outcome.
    pub async fn generate(
        &self,
        owner: &str,
        spec: GenerationSpec,
    ) -> OrchestratorResult<GenerationSuccess> {
        let mut record = self.accept(owner, spec).await?;
        self.drive(&mut record).await
    }

    /// Fire-and-forget mode: reserve, create the record, then return the
    /// task id while the run continues on a detached task. Caller-fixable
    /// failures (upload, insufficient credits, no provider) still surface
    /// immediately since they happen before acceptance.
    pub async fn generate_detached(
        self: &Arc<Self>,
        owner: &str,
        spec: GenerationSpec,
    ) -> OrchestratorResult<TaskId> {
        let mut record = self.accept(owner, spec).await?;
        let task_id = record.id.clone();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.drive(&mut record).await {
                Ok(success) => {
                    debug!(task_id = %success.task_id, "Detached task finished");
                }
                Err(e) => {
                    // Terminal failures are already persisted and refunded
                    // inside drive; nothing to do but log.
                    debug!(task_id = %record.id, "Detached task failed: {}", e);
                }
            }
        });

        Ok(task_id)
    }

    /// Status projection for a task id, readable from any connection.
    pub async fn status(&self, id: &TaskId) -> OrchestratorResult<TaskStatus> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(id.to_string()))?;
        Ok(TaskStatus::from(&record))
    }

    /// Resume non-terminal records after a restart and run the
    /// reconciliation sweep over terminal ones. Returns the number of
    /// resumed tasks.
    pub async fn recover(self: &Arc<Self>) -> OrchestratorResult<usize> {
        let active = self.store.list_active().await?;
        let resumed = active.len();

        for mut record in active {
            info!(task_id = %record.id, state = %record.state, "Resuming task after restart");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.drive(&mut record).await {
                    debug!(task_id = %record.id, "Resumed task failed: {}", e);
                }
            });
        }

        for record in self.store.list_terminal().await? {
            match self.reconciler.reconcile_record(&record, &self.config).await {
                Ok(true) => {
                    // Keep the record's refund flag consistent with the ledger
                    if matches!(record.state, TaskState::Failed | TaskState::Exhausted) {
                        let mut record = record;
                        record.mark_refunded();
                        if let Err(e) = self.store.update(&record).await {
                            warn!(task_id = %record.id, "Failed to persist refund flag: {}", e);
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(task_id = %record.id, "Reconciliation sweep error: {}", e);
                }
            }
        }

        Ok(resumed)
    }

    /// Purge terminal records past the retention window. Returns the
    /// number purged.
    pub async fn purge_expired(&self) -> OrchestratorResult<usize> {
        let policy = RetentionPolicy::new(self.config.retention_window);
        Ok(self.store.purge_terminal_before(policy.cutoff()).await?)
    }

    /// Everything up to acceptance: resolve media, check the chain,
    /// reserve credits, persist the record. Failures here never touch
    /// credits except the create-after-reserve edge, which refunds.
    async fn accept(&self, owner: &str, spec: GenerationSpec) -> OrchestratorResult<TaskRecord> {
        // Media preparation runs before any reservation: an unresolvable
        // image would make every downstream attempt pointless.
        let spec = media::resolve_image(spec, self.uploader.as_ref()).await?;

        if self.chains.chain_for(&spec).is_empty() {
            return Err(OrchestratorError::NoProvider(spec.kind.to_string()));
        }

        let (reservation_id, amount) = self.reconciler.reserve(owner, &spec).await?;

        let record = TaskRecord::new(owner, spec, reservation_id);
        if let Err(e) = self.store.create(&record).await {
            // The reservation exists but the task will never run
            if let Err(refund_err) = self
                .reconciler
                .settle_failure(
                    &record.reservation_id,
                    FailureClass::Unavailable,
                    "task record creation failed",
                )
                .await
            {
                warn!(task_id = %record.id, "Refund after create failure also failed: {}", refund_err);
            }
            return Err(e.into());
        }

        metrics::record_task(record.spec.kind.as_str());
        info!(
            task_id = %record.id,
            owner,
            kind = %record.spec.kind,
            credits = amount,
            "Accepted generation task"
        );
        Ok(record)
    }

    /// The shared run loop: walk the attempt plan until success, a
    /// terminal rejection, or exhaustion. Also the resume path: consumed
    /// plan slots are derived from the record's terminal attempts and a
    /// live handle is re-polled before anything new is submitted.
    async fn drive(&self, record: &mut TaskRecord) -> OrchestratorResult<GenerationSuccess> {
        let plan = self
            .chains
            .plan_for(&record.spec, self.config.same_provider_retries);

        let mut slot = record
            .attempts
            .iter()
            .filter(|a| a.outcome.is_terminal())
            .count();
        let mut last_failure: Option<(FailureClass, String)> = None;

        // Resume a live attempt left behind by a previous run
        if let Some(attempt) = record.current_attempt() {
            let provider_name = attempt.provider.clone();
            match (attempt.job_id.clone(), self.chains.by_name(&provider_name)) {
                (Some(job_id), Some(provider)) => {
                    let handle = JobHandle::new(provider_name, job_id);
                    let _permit = self.acquire(provider.name()).await;
                    let outcome = match self
                        .machine
                        .poll_to_terminal(provider.as_ref(), record, &handle)
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(e) => return Err(self.abort_on_store_error(record, e).await),
                    };
                    match outcome {
                        AttemptOutcomeSummary::Succeeded { result_url } => {
                            return self.finish_success(record, result_url).await;
                        }
                        AttemptOutcomeSummary::Failed { class, reason } => {
                            if !class.is_retryable() {
                                return Err(self.finish_failure(record, class, reason, false).await?);
                            }
                            last_failure = Some((class, reason));
                            slot += 1;
                        }
                    }
                }
                _ => {
                    // Interrupted before submission, or the provider is no
                    // longer configured; close the attempt and move on.
                    record.attempt_failed(
                        FailureClass::Unavailable,
                        "attempt interrupted before completion",
                    );
                    if let Err(e) = self.store.update(record).await {
                        return Err(self.abort_on_store_error(record, e.into()).await);
                    }
                    slot += 1;
                }
            }
        }

        while slot < plan.len() {
            let provider = &plan[slot];

            if last_failure.is_some() {
                metrics::record_fallback(provider.name());
            }

            let _permit = self.acquire(provider.name()).await;
            let outcome = match self.machine.run_attempt(provider.as_ref(), record).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.abort_on_store_error(record, e).await),
            };

            match outcome {
                AttemptOutcomeSummary::Succeeded { result_url } => {
                    return self.finish_success(record, result_url).await;
                }
                AttemptOutcomeSummary::Failed { class, reason } => {
                    if !class.is_retryable() {
                        // Trying another provider would waste time and
                        // money on a request the caller needs to fix.
                        return Err(self.finish_failure(record, class, reason, false).await?);
                    }
                    last_failure = Some((class, reason));
                    slot += 1;
                }
            }
        }

        let (class, reason) = last_failure.unwrap_or((
            FailureClass::Unavailable,
            "no provider attempts were made".to_string(),
        ));
        Err(self.finish_failure(record, class, reason, true).await?)
    }

    async fn finish_success(
        &self,
        record: &mut TaskRecord,
        result_url: String,
    ) -> OrchestratorResult<GenerationSuccess> {
        // The terminal record state is already persisted by the state
        // machine; confirming the debit comes after, and the recovery
        // sweep covers a crash in between.
        self.reconciler
            .settle_success(&record.reservation_id)
            .await?;

        let provider_used = record
            .attempts
            .last()
            .map(|a| a.provider.clone())
            .unwrap_or_default();

        Ok(GenerationSuccess {
            task_id: record.id.clone(),
            result_url,
            provider_used,
        })
    }

    /// The single terminal-failure path: persist the terminal state,
    /// issue the refund, and build the caller-visible error. Terminal
    /// failure and refund are one code path by construction.
    async fn finish_failure(
        &self,
        record: &mut TaskRecord,
        class: FailureClass,
        reason: String,
        exhausted: bool,
    ) -> OrchestratorResult<OrchestratorError> {
        if exhausted {
            record.exhaust(&reason);
        } else {
            record.fail(&reason);
        }
        self.store.update(record).await?;

        let refunded = self
            .reconciler
            .settle_failure(&record.reservation_id, class, &reason)
            .await?;
        if refunded {
            record.mark_refunded();
            self.store.update(record).await?;
        }

        let credits_refunded = record.credits_refunded;
        let error = if exhausted {
            OrchestratorError::Exhausted {
                task_id: record.id.clone(),
                reason,
                credits_refunded,
            }
        } else {
            OrchestratorError::GenerationFailed {
                task_id: record.id.clone(),
                class,
                reason,
                credits_refunded,
            }
        };
        Ok(error)
    }

    /// A store error mid-run would otherwise leave a non-terminal record
    /// holding a Reserved reservation until the next startup sweep. Close
    /// the record and refund now; the extra persistence here is
    /// best-effort since the store is already misbehaving.
    async fn abort_on_store_error(
        &self,
        record: &mut TaskRecord,
        error: OrchestratorError,
    ) -> OrchestratorError {
        warn!(task_id = %record.id, "Aborting task on storage error: {}", error);

        record.fail("internal storage failure");
        if let Err(e) = self.store.update(record).await {
            warn!(task_id = %record.id, "Failed to persist aborted record: {}", e);
        }

        match self
            .reconciler
            .settle_failure(
                &record.reservation_id,
                FailureClass::Unavailable,
                "aborted on storage error",
            )
            .await
        {
            Ok(true) => {
                record.mark_refunded();
                if let Err(e) = self.store.update(record).await {
                    warn!(task_id = %record.id, "Failed to persist refund flag: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(task_id = %record.id, "Refund after storage error also failed: {}", e);
            }
        }

        error
    }

    async fn acquire(&self, provider: &str) -> Option<OwnedSemaphorePermit> {
        match self.semaphores.get(provider) {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}
