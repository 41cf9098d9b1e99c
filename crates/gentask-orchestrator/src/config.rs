//! Orchestrator configuration.

use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fixed interval between status polls
    pub poll_interval: Duration,
    /// Poll budget per attempt; providers give no push notification, so an
    /// unbounded loop would leak the handling task and the reserved
    /// credits indefinitely. 72 polls at 5s is 6 minutes wall clock.
    pub max_poll_attempts: u32,
    /// Extra retries on the last provider in a chain before exhaustion
    pub same_provider_retries: u32,
    /// Maximum concurrent live attempts per provider
    pub max_concurrent_per_provider: usize,
    /// Grace period before the recovery sweep settles a task stuck in
    /// Succeeded with a still-Reserved reservation
    pub reconcile_grace: Duration,
    /// How long terminal task records are retained before purge
    pub retention_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 72,
            same_provider_retries: 2,
            max_concurrent_per_provider: 8,
            reconcile_grace: Duration::from_secs(60),
            retention_window: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("GENTASK_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.poll_interval.as_secs()),
            ),
            max_poll_attempts: std::env::var("GENTASK_MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_poll_attempts),
            same_provider_retries: std::env::var("GENTASK_SAME_PROVIDER_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.same_provider_retries),
            max_concurrent_per_provider: std::env::var("GENTASK_MAX_CONCURRENT_PER_PROVIDER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_per_provider),
            reconcile_grace: Duration::from_secs(
                std::env::var("GENTASK_RECONCILE_GRACE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.reconcile_grace.as_secs()),
            ),
            retention_window: Duration::from_secs(
                std::env::var("GENTASK_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retention_window.as_secs()),
            ),
        }
    }
}
