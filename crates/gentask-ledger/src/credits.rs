//! Credit ledger operations.
//!
//! The ledger is the only mutable state shared by concurrent tasks of the
//! same owner. `reserve` is an atomic check-and-decrement: two concurrent
//! reservations whose combined amount exceeds the balance must resolve to
//! exactly one success and one `InsufficientCredits`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use gentask_models::{CreditReservation, ReservationId, ReservationState};

use crate::error::{LedgerError, LedgerResult};

/// The external balance service: debit on reserve, settle exactly once.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically hold `amount` credits from `owner`'s balance.
    ///
    /// Fails with `InsufficientCredits` without side effects if the
    /// balance is below `amount`.
    async fn reserve(
        &self,
        owner: &str,
        amount: u32,
        description: &str,
    ) -> LedgerResult<ReservationId>;

    /// Confirm the debit. Valid only from `Reserved`.
    async fn confirm(&self, id: &ReservationId) -> LedgerResult<()>;

    /// Return the held credits to the owner. Valid only from `Reserved`.
    async fn refund(&self, id: &ReservationId, reason: &str) -> LedgerResult<()>;

    /// Current spendable balance.
    async fn balance(&self, owner: &str) -> LedgerResult<u32>;

    /// Look up a reservation (recovery sweeps need the state and age).
    async fn get_reservation(&self, id: &ReservationId) -> LedgerResult<CreditReservation>;
}

#[derive(Default)]
struct LedgerInner {
    balances: HashMap<String, u32>,
    reservations: HashMap<String, CreditReservation>,
}

/// In-memory ledger with the reference semantics.
///
/// A single mutex serializes reservations per process, which is the
/// check-and-decrement guarantee a backing store must provide with a
/// conditional update or transaction.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credits to an owner's balance (top-up, admin grant, seeding).
    pub async fn credit(&self, owner: &str, amount: u32) {
        let mut inner = self.inner.lock().await;
        let balance = inner.balances.entry(owner.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
        debug!(owner, amount, balance = *balance, "Credited owner");
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn reserve(
        &self,
        owner: &str,
        amount: u32,
        description: &str,
    ) -> LedgerResult<ReservationId> {
        let mut inner = self.inner.lock().await;

        let available = inner.balances.get(owner).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientCredits {
                needed: amount,
                available,
            });
        }

        inner.balances.insert(owner.to_string(), available - amount);

        let reservation = CreditReservation::new(owner, amount);
        let id = reservation.id.clone();
        inner
            .reservations
            .insert(id.as_str().to_string(), reservation);

        info!(
            owner,
            amount,
            reservation_id = %id,
            description,
            "Reserved credits"
        );
        Ok(id)
    }

    async fn confirm(&self, id: &ReservationId) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;
        let reservation = inner
            .reservations
            .get_mut(id.as_str())
            .ok_or_else(|| LedgerError::ReservationNotFound(id.to_string()))?;

        if reservation.state.is_settled() {
            return Err(LedgerError::AlreadySettled {
                id: id.to_string(),
                state: reservation.state,
            });
        }

        reservation.state = ReservationState::Confirmed;
        reservation.settled_at = Some(Utc::now());
        info!(reservation_id = %id, amount = reservation.amount, "Confirmed reservation");
        Ok(())
    }

    async fn refund(&self, id: &ReservationId, reason: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;
        let reservation = inner
            .reservations
            .get(id.as_str())
            .ok_or_else(|| LedgerError::ReservationNotFound(id.to_string()))?;

        if reservation.state.is_settled() {
            warn!(
                reservation_id = %id,
                state = %reservation.state,
                "Refund attempted on settled reservation"
            );
            return Err(LedgerError::AlreadySettled {
                id: id.to_string(),
                state: reservation.state,
            });
        }

        let owner = reservation.owner_id.clone();
        let amount = reservation.amount;

        let balance = inner.balances.entry(owner.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);

        let reservation = inner
            .reservations
            .get_mut(id.as_str())
            .expect("reservation checked above");
        reservation.state = ReservationState::Refunded;
        reservation.refund_reason = Some(reason.to_string());
        reservation.settled_at = Some(Utc::now());

        info!(
            reservation_id = %id,
            owner = %owner,
            amount,
            reason,
            "Refunded reservation"
        );
        Ok(())
    }

    async fn balance(&self, owner: &str) -> LedgerResult<u32> {
        let inner = self.inner.lock().await;
        Ok(inner.balances.get(owner).copied().unwrap_or(0))
    }

    async fn get_reservation(&self, id: &ReservationId) -> LedgerResult<CreditReservation> {
        let inner = self.inner.lock().await;
        inner
            .reservations
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| LedgerError::ReservationNotFound(id.to_string()))
    }
}
