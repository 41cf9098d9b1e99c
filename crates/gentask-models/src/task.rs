//! Task record definitions.
//!
//! A [`TaskRecord`] is the durable unit of work: one accepted generation
//! request, its ordered provider attempts, and its credit reservation
//! reference. Records survive process restarts and are readable from
//! connections other than the one that created them (fire-and-forget mode).

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reservation::ReservationId;
use crate::spec::GenerationSpec;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
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

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitting to a provider (no live job yet)
    #[default]
    Submitting,
    /// A provider accepted the job; polling for completion
    Polling,
    /// A provider produced a result
    Succeeded,
    /// The current attempt failed terminally
    Failed,
    /// The whole fallback chain was tried and failed
    Exhausted,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitting => "submitting",
            TaskState::Polling => "polling",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Exhausted => "exhausted",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Exhausted
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of an attempt failure.
///
/// Returned by provider adapters as an enumerated class, never inferred
/// from provider prose, so the fallback coordinator can decide whether
/// trying another provider is worth time and money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Provider says the request itself is invalid or policy-violating.
    /// Terminal: no other provider is tried.
    Rejected,
    /// Transient provider trouble (network, 5xx, overload). Worth a
    /// different provider or a bounded same-provider retry.
    Unavailable,
    /// Attempt budget exhausted without a terminal provider status.
    /// Treated like `Unavailable` for fallback purposes.
    Timeout,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Rejected => "rejected",
            FailureClass::Unavailable => "unavailable",
            FailureClass::Timeout => "timeout",
        }
    }

    /// Whether another attempt (same or next provider) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Unavailable | FailureClass::Timeout)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AttemptOutcome {
    /// Attempt is still live (submitting or polling)
    Pending,
    /// Provider delivered a result
    Succeeded { result_url: String },
    /// Attempt ended without a result
    Failed { class: FailureClass, reason: String },
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptOutcome::Pending)
    }
}

/// One provider submission belonging to a task.
///
/// A task accumulates attempts in order via fallback; at most one attempt
/// is live at a time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Attempt {
    /// Adapter name that ran this attempt
    pub provider: String,

    /// Provider-assigned job identifier; None until submit succeeds.
    /// Never reused across providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Terminal outcome, or Pending while live
    pub outcome: AttemptOutcome,

    /// When the attempt was started
    pub started_at: DateTime<Utc>,

    /// When the attempt reached a terminal outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            job_id: None,
            outcome: AttemptOutcome::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// The durable record of one generation task.
///
/// Mutated only by the task state machine and the fallback coordinator;
/// every transition is persisted before being acted upon further.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskRecord {
    /// Caller-visible task ID
    pub id: TaskId,

    /// Owner (the user being charged)
    pub owner_id: String,

    /// What to generate
    pub spec: GenerationSpec,

    /// Reference to the credit reservation held for this task.
    /// The reservation itself lives in the external ledger.
    pub reservation_id: ReservationId,

    /// Ordered provider attempts (one live at a time)
    pub attempts: Vec<Attempt>,

    /// Current lifecycle state
    pub state: TaskState,

    /// Result asset URL when Succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Last error when Failed/Exhausted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Whether the reservation was refunded. Callers must always learn
    /// whether credits were affected.
    #[serde(default)]
    pub credits_refunded: bool,

    /// When the task was accepted
    pub created_at: DateTime<Utc>,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new record in `Submitting` state with no attempts yet.
    pub fn new(owner_id: impl Into<String>, spec: GenerationSpec, reservation_id: ReservationId) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            owner_id: owner_id.into(),
            spec,
            reservation_id,
            attempts: Vec::new(),
            state: TaskState::Submitting,
            result_url: None,
            last_error: None,
            credits_refunded: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Number of attempts recorded so far.
    pub fn attempts_tried(&self) -> usize {
        self.attempts.len()
    }

    /// The attempt currently live, if any.
    pub fn current_attempt(&self) -> Option<&Attempt> {
        self.attempts.last().filter(|a| !a.outcome.is_terminal())
    }

    /// Start a new attempt against the given provider.
    pub fn begin_attempt(&mut self, provider: impl Into<String>) {
        debug_assert!(self.current_attempt().is_none(), "one live attempt at a time");
        self.attempts.push(Attempt::new(provider));
        self.state = TaskState::Submitting;
        self.updated_at = Utc::now();
    }

    /// Record that the provider accepted the submission.
    pub fn attempt_submitted(&mut self, job_id: impl Into<String>) {
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.job_id = Some(job_id.into());
        }
        self.state = TaskState::Polling;
        self.updated_at = Utc::now();
    }

    /// Record a terminal failure for the live attempt (does not decide
    /// the task's fate; the fallback coordinator does that).
    pub fn attempt_failed(&mut self, class: FailureClass, reason: impl Into<String>) {
        let now = Utc::now();
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.outcome = AttemptOutcome::Failed {
                class,
                reason: reason.into(),
            };
            attempt.finished_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Mark the task succeeded with a result.
    pub fn complete(&mut self, result_url: impl Into<String>) {
        let url = result_url.into();
        let now = Utc::now();
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.outcome = AttemptOutcome::Succeeded {
                result_url: url.clone(),
            };
            attempt.finished_at = Some(now);
        }
        self.state = TaskState::Succeeded;
        self.result_url = Some(url);
        self.updated_at = now;
    }

    /// Mark the task failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = TaskState::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark the task exhausted (whole chain tried and failed).
    pub fn exhaust(&mut self, error: impl Into<String>) {
        self.state = TaskState::Exhausted;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Record that the reservation was refunded.
    pub fn mark_refunded(&mut self) {
        self.credits_refunded = true;
        self.updated_at = Utc::now();
    }
}
