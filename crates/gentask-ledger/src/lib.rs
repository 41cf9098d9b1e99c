//! Credit ledger and task store for GenTask.
//!
//! Both are traits so the orchestrator stays independent of the storage
//! backend. The in-memory implementations provide the reference
//! semantics: atomic check-and-decrement reservations and a task record
//! store readable across connections.

pub mod credits;
pub mod error;
pub mod tasks;

pub use credits::{CreditLedger, InMemoryLedger};
pub use error::{LedgerError, LedgerResult};
pub use tasks::{InMemoryTaskStore, RetentionPolicy, TaskStore};
