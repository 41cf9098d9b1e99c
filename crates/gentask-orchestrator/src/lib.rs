//! Generation task orchestrator.
//!
//! Drives one generation request from credit reservation through provider
//! submission, polling, fallback and final credit reconciliation. Both
//! operating modes (synchronous and fire-and-forget) are callers of the
//! same state machine; the only difference is whether the polling loop is
//! awaited inline or on a detached task.
//!
//! Known limitation: there is no manual abort for a live attempt. The
//! providers expose no cancel API, so an abort endpoint could not actually
//! stop provider-side compute; per-attempt poll budgets are the only
//! cancellation trigger.

pub mod chain;
pub mod config;
pub mod error;
pub mod machine;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;

pub use chain::FallbackChains;
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use machine::{AttemptOutcomeSummary, TaskStateMachine};
pub use orchestrator::{GenerationSuccess, Orchestrator, TaskStatus};
pub use reconciler::CreditReconciler;
