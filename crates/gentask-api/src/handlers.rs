//! API handlers.

pub mod generations;
pub mod health;
pub mod owners;

pub use health::health;
