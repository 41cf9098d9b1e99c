//! Application state.

use std::sync::Arc;

use gentask_ledger::{InMemoryLedger, InMemoryTaskStore};
use gentask_orchestrator::{FallbackChains, Orchestrator, OrchestratorConfig};
use gentask_provider::{HttpUploader, PulsarClient, VeyraClient};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<InMemoryLedger>,
}

impl AppState {
    /// Create application state from environment variables.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let chains = FallbackChains::new()
            .with(Arc::new(VeyraClient::from_env()?))
            .with(Arc::new(PulsarClient::from_env()?));
        let uploader = Arc::new(HttpUploader::from_env()?);

        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemoryTaskStore::new());

        let orchestrator = Arc::new(Orchestrator::new(
            chains,
            ledger.clone(),
            store,
            uploader,
            OrchestratorConfig::from_env(),
        ));

        Ok(Self {
            config,
            orchestrator,
            ledger,
        })
    }

    /// Assemble state from already-built parts (tests).
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: Arc<Orchestrator>,
        ledger: Arc<InMemoryLedger>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            ledger,
        }
    }
}
