//! Provider registry.
//!
//! A plain container of already-constructed provider adapters, keyed by
//! the routing prefix they bind (§4.5). Concrete adapters (OpenAI,
//! Anthropic, a local-process runner's HTTP surface) are wired in by
//! whatever embeds this crate — constructing them from `ProviderEntry`
//! config is outside the provider interface's scope (§1 lists transport
//! adapters beyond the interface itself as out of scope).

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::LlmProvider;

/// Holds all registered provider adapters.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    /// Register a provider under a routing prefix. Replaces any existing
    /// registration under the same id.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider ids, sorted.
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
