//! Ledger error types.

use thiserror::Error;

use gentask_models::ReservationState;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Owner's balance is below the requested reservation amount.
    /// Caller-fixable; no reservation was made.
    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// A second settle was attempted against an already-settled
    /// reservation. The reservation invariant makes this an error, never
    /// a silent no-op.
    #[error("Reservation {id} already settled as {state}")]
    AlreadySettled { id: String, state: ReservationState },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task already exists: {0}")]
    TaskAlreadyExists(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, LedgerError::InsufficientCredits { .. })
    }

    pub fn is_already_settled(&self) -> bool {
        matches!(self, LedgerError::AlreadySettled { .. })
    }
}
