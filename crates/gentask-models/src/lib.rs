//! Shared data models for the GenTask backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation specs (what to generate)
//! - Task records and attempts (durable unit of work)
//! - Credit reservations
//! - Credit cost calculation

pub mod credit_cost;
pub mod reservation;
pub mod spec;
pub mod task;

// Re-export common types
pub use credit_cost::{CostBreakdown, GenerationCostCalculator};
pub use reservation::{CreditReservation, ReservationId, ReservationState};
pub use spec::{AspectRatio, GenerationKind, GenerationSpec, ImageSource, QualityTier};
pub use task::{Attempt, AttemptOutcome, FailureClass, TaskId, TaskRecord, TaskState};
