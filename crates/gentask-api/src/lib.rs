//! HTTP API for the generation task orchestrator.
//!
//! Thin layer over [`gentask_orchestrator`]: request decoding, the owner
//! header, the `wait` flag (sync vs fire-and-forget) and the HTTP error
//! mapping. All orchestration semantics live below this crate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
