//! Credit reconciliation.
//!
//! The single narrow interface every call site uses for reservation,
//! confirm and refund. Terminal failure and refund are the same code path
//! in the orchestrator, and both go through here; no handler mutates
//! balances directly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use gentask_ledger::{CreditLedger, LedgerError};
use gentask_models::{
    AttemptOutcome, FailureClass, GenerationCostCalculator, GenerationSpec, ReservationId,
    ReservationState, TaskRecord, TaskState,
};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::metrics;

/// Wraps the external ledger with the task-level reconciliation rules.
#[derive(Clone)]
pub struct CreditReconciler {
    ledger: Arc<dyn CreditLedger>,
}

impl CreditReconciler {
    pub fn new(ledger: Arc<dyn CreditLedger>) -> Self {
        Self { ledger }
    }

    /// Reserve credits for a spec. Called exactly once per task, before
    /// the first submit.
    pub async fn reserve(
        &self,
        owner: &str,
        spec: &GenerationSpec,
    ) -> OrchestratorResult<(ReservationId, u32)> {
        let breakdown = GenerationCostCalculator::new(spec).calculate();
        let description = breakdown.to_description(spec);

        match self
            .ledger
            .reserve(owner, breakdown.total, &description)
            .await
        {
            Ok(id) => Ok((id, breakdown.total)),
            Err(LedgerError::InsufficientCredits { needed, available }) => {
                Err(OrchestratorError::InsufficientCredits { needed, available })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Confirm the debit after success. Idempotent against a reservation
    /// already confirmed by a previous (crashed) run; a reservation found
    /// refunded here is an invariant breach and is only logged, never
    /// "corrected" with a second settle.
    pub async fn settle_success(&self, id: &ReservationId) -> OrchestratorResult<()> {
        match self.ledger.confirm(id).await {
            Ok(()) => {
                metrics::record_confirm();
                Ok(())
            }
            Err(LedgerError::AlreadySettled { state, .. })
                if state == ReservationState::Confirmed =>
            {
                Ok(())
            }
            Err(LedgerError::AlreadySettled { state, .. }) => {
                error!(
                    reservation_id = %id,
                    state = %state,
                    "Reservation invariant breach: confirm attempted after refund"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refund after a terminal failure. Returns whether a refund was
    /// actually issued now (false if the reservation was already settled).
    /// The class labels the refund metric; the free-form reason only goes
    /// to the ledger entry.
    pub async fn settle_failure(
        &self,
        id: &ReservationId,
        class: FailureClass,
        reason: &str,
    ) -> OrchestratorResult<bool> {
        match self.ledger.refund(id, reason).await {
            Ok(()) => {
                metrics::record_refund(class.as_str());
                Ok(true)
            }
            Err(LedgerError::AlreadySettled { state, .. }) => {
                warn!(
                    reservation_id = %id,
                    state = %state,
                    "Refund skipped: reservation already settled"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Recovery sweep over terminal records: a task that crashed between
    /// "provider said Succeeded" and "debit confirmed" leaves a Succeeded
    /// record with a still-Reserved reservation. Past the grace period we
    /// retry the confirm; failed/exhausted records with an unsettled
    /// reservation get their refund. Exactly one settle either way.
    pub async fn reconcile_record(
        &self,
        record: &TaskRecord,
        config: &OrchestratorConfig,
    ) -> OrchestratorResult<bool> {
        let reservation = self.ledger.get_reservation(&record.reservation_id).await?;
        if reservation.state.is_settled() {
            return Ok(false);
        }

        let grace =
            chrono::Duration::from_std(config.reconcile_grace).unwrap_or(chrono::Duration::zero());
        if Utc::now() - record.updated_at < grace {
            return Ok(false);
        }

        match record.state {
            TaskState::Succeeded => {
                info!(task_id = %record.id, "Recovering unconfirmed debit for succeeded task");
                self.settle_success(&record.reservation_id).await?;
                Ok(true)
            }
            TaskState::Failed | TaskState::Exhausted => {
                info!(task_id = %record.id, "Recovering missing refund for failed task");
                self.settle_failure(&record.reservation_id, last_failure_class(record), "recovery sweep")
                    .await?;
                Ok(true)
            }
            // Non-terminal records are resumed by the orchestrator, not
            // settled here.
            _ => Ok(false),
        }
    }
}

/// Class of the most recent failed attempt, for the refund metric label.
/// Records that died without a classified attempt count as unavailable.
fn last_failure_class(record: &TaskRecord) -> FailureClass {
    record
        .attempts
        .iter()
        .rev()
        .find_map(|attempt| match &attempt.outcome {
            AttemptOutcome::Failed { class, .. } => Some(*class),
            _ => None,
        })
        .unwrap_or(FailureClass::Unavailable)
}
