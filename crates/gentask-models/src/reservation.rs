//! Credit reservation definitions.
//!
//! A reservation is a hold placed on a user's credit balance pending the
//! outcome of a task. The ledger owns reservations; task records only
//! carry the [`ReservationId`].

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a credit reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ReservationId(pub String);

impl ReservationId {
    /// Generate a new random reservation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reservation lifecycle state.
///
/// Invariant: a reservation transitions to exactly one terminal state
/// (Confirmed XOR Refunded) once its owning task is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Credits held, outcome pending
    #[default]
    Reserved,
    /// Debit confirmed (task succeeded)
    Confirmed,
    /// Credits returned (task failed/exhausted)
    Refunded,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Reserved => "reserved",
            ReservationState::Confirmed => "confirmed",
            ReservationState::Refunded => "refunded",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, ReservationState::Reserved)
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hold on a user's credit balance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreditReservation {
    /// Unique reservation ID
    pub id: ReservationId,

    /// Owner being charged
    pub owner_id: String,

    /// Credits held
    pub amount: u32,

    /// Current state
    pub state: ReservationState,

    /// Refund reason when refunded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,

    /// When the hold was placed
    pub created_at: DateTime<Utc>,

    /// When the reservation was settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl CreditReservation {
    /// Create a new reservation in `Reserved` state.
    pub fn new(owner_id: impl Into<String>, amount: u32) -> Self {
        Self {
            id: ReservationId::new(),
            owner_id: owner_id.into(),
            amount,
            state: ReservationState::Reserved,
            refund_reason: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Age of an unsettled reservation, for recovery grace checks.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reservation() {
        let res = CreditReservation::new("user-1", 10);
        assert_eq!(res.state, ReservationState::Reserved);
        assert!(!res.state.is_settled());
        assert_eq!(res.amount, 10);
        assert!(res.settled_at.is_none());
    }

    #[test]
    fn test_settled_states() {
        assert!(ReservationState::Confirmed.is_settled());
        assert!(ReservationState::Refunded.is_settled());
        assert!(!ReservationState::Reserved.is_settled());
    }
}
