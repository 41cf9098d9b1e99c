//! Orchestrator metrics collection.
//!
//! Counters for task intake and outcomes, per-provider attempts and the
//! two reconciliation actions. Reconciliation counters exist specifically
//! so a confirm/refund imbalance shows up on a dashboard.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Tasks accepted (reservation made, record created).
    pub const TASKS_TOTAL: &str = "gentask_tasks_total";

    /// Provider attempts by provider and outcome.
    pub const ATTEMPTS_TOTAL: &str = "gentask_attempts_total";

    /// Status polls issued by provider.
    pub const POLLS_TOTAL: &str = "gentask_polls_total";

    /// Fallback advances (attempt failed retryably, chain continued).
    pub const FALLBACKS_TOTAL: &str = "gentask_fallbacks_total";

    /// Reservation confirms.
    pub const CONFIRMS_TOTAL: &str = "gentask_confirms_total";

    /// Reservation refunds.
    pub const REFUNDS_TOTAL: &str = "gentask_refunds_total";
}

/// Record an accepted task.
pub fn record_task(kind: &str) {
    counter!(names::TASKS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record a finished provider attempt.
pub fn record_attempt(provider: &str, outcome: &str) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one status poll.
pub fn record_poll(provider: &str) {
    counter!(names::POLLS_TOTAL, "provider" => provider.to_string()).increment(1);
}

/// Record a fallback advance.
pub fn record_fallback(from_provider: &str) {
    counter!(names::FALLBACKS_TOTAL, "from" => from_provider.to_string()).increment(1);
}

/// Record a reservation confirm.
pub fn record_confirm() {
    counter!(names::CONFIRMS_TOTAL).increment(1);
}

/// Record a reservation refund, labeled by the bounded failure class
/// (free-form failure prose would blow up label cardinality).
pub fn record_refund(class: &'static str) {
    counter!(names::REFUNDS_TOTAL, "class" => class).increment(1);
}
