//! Fallback chains.
//!
//! Holds the ordered provider chain per generation kind and builds the
//! attempt plan for one task: which providers to try, in which order, and
//! how many tries the last one gets before the chain is exhausted. An
//! explicit user preference (the spec's provider hint) always wins over
//! the default chain order.

use std::collections::HashMap;
use std::sync::Arc;

use gentask_models::{GenerationKind, GenerationSpec};
use gentask_provider::GenerationProvider;

/// Ordered provider chains per generation kind.
#[derive(Clone, Default)]
pub struct FallbackChains {
    chains: HashMap<GenerationKind, Vec<Arc<dyn GenerationProvider>>>,
}

impl FallbackChains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider at the end of the chain for every kind it
    /// supports. Registration order is chain order.
    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) {
        for kind in [
            GenerationKind::Video,
            GenerationKind::Image,
            GenerationKind::Voice,
        ] {
            if provider.supports(kind) {
                self.chains.entry(kind).or_default().push(provider.clone());
            }
        }
    }

    /// Builder-style registration.
    pub fn with(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(provider);
        self
    }

    /// All registered providers, deduplicated by name.
    pub fn providers(&self) -> Vec<Arc<dyn GenerationProvider>> {
        let mut seen = Vec::new();
        let mut out: Vec<Arc<dyn GenerationProvider>> = Vec::new();
        for chain in self.chains.values() {
            for provider in chain {
                if !seen.contains(&provider.name().to_string()) {
                    seen.push(provider.name().to_string());
                    out.push(provider.clone());
                }
            }
        }
        out
    }

    /// Look up a provider by name (resume after restart).
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers().into_iter().find(|p| p.name() == name)
    }

    /// The chain for one spec: providers supporting the kind, with the
    /// hinted provider moved to the front when the user named one.
    pub fn chain_for(&self, spec: &GenerationSpec) -> Vec<Arc<dyn GenerationProvider>> {
        let mut chain = self.chains.get(&spec.kind).cloned().unwrap_or_default();

        if let Some(hint) = &spec.provider_hint {
            if let Some(pos) = chain.iter().position(|p| p.name() == hint) {
                let preferred = chain.remove(pos);
                chain.insert(0, preferred);
            }
        }

        chain
    }

    /// The full attempt plan: each provider once, with the last repeated
    /// for its bounded same-provider retries.
    pub fn plan_for(
        &self,
        spec: &GenerationSpec,
        same_provider_retries: u32,
    ) -> Vec<Arc<dyn GenerationProvider>> {
        let chain = self.chain_for(spec);
        let mut plan = chain.clone();
        if let Some(last) = chain.last() {
            for _ in 0..same_provider_retries {
                plan.push(last.clone());
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use gentask_provider::{JobHandle, PollStatus, ProviderResult};

    use super::*;

    struct NamedProvider {
        name: &'static str,
        kinds: Vec<GenerationKind>,
    }

    #[async_trait]
    impl GenerationProvider for NamedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, kind: GenerationKind) -> bool {
            self.kinds.contains(&kind)
        }

        async fn submit(&self, _spec: &GenerationSpec) -> ProviderResult<JobHandle> {
            unimplemented!("chain tests never submit")
        }

        async fn poll(&self, _handle: &JobHandle) -> ProviderResult<PollStatus> {
            unimplemented!("chain tests never poll")
        }
    }

    fn video_provider(name: &'static str) -> Arc<dyn GenerationProvider> {
        Arc::new(NamedProvider {
            name,
            kinds: vec![GenerationKind::Video],
        })
    }

    fn chains() -> FallbackChains {
        FallbackChains::new()
            .with(video_provider("veyra"))
            .with(video_provider("pulsar"))
    }

    #[test]
    fn test_chain_order_follows_registration() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x");
        let chain = chains().chain_for(&spec);
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["veyra", "pulsar"]);
    }

    #[test]
    fn test_hint_moves_provider_to_front() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x").with_provider_hint("pulsar");
        let chain = chains().chain_for(&spec);
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["pulsar", "veyra"]);
    }

    #[test]
    fn test_unknown_hint_is_ignored() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x").with_provider_hint("nonsense");
        let chain = chains().chain_for(&spec);
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["veyra", "pulsar"]);
    }

    #[test]
    fn test_unsupported_kind_has_empty_chain() {
        let spec = GenerationSpec::new(GenerationKind::Voice, "x");
        assert!(chains().chain_for(&spec).is_empty());
    }

    #[test]
    fn test_plan_repeats_last_provider() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x");
        let plan = chains().plan_for(&spec, 2);
        let names: Vec<&str> = plan.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["veyra", "pulsar", "pulsar", "pulsar"]);
    }
}
