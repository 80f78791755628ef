//! Model provider router (C7).
//!
//! Resolves a deck's `modelParams.model` — a single model name or an
//! ordered candidate list (§4.4) — to a concrete provider call. Resolution
//! order per candidate: alias lookup across configured providers, then
//! `"provider_id/model_name"` prefix binding, then the configured default
//! provider for an unprefixed literal model id. The router tries
//! candidates in order and falls back to the next one when a call fails
//! or no provider is available for it (§4.5).

use std::collections::HashSet;
use std::sync::Mutex;

use gambit_domain::config::ProvidersConfig;
use gambit_domain::error::{Error, Result};

use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, StreamTextCallback};

/// Either a single model name or an ordered list of candidates to try in
/// order, mirroring the deck loader's `ModelSelector` (kept separate here
/// so this crate doesn't depend on `gambit-loader`).
#[derive(Debug, Clone)]
pub enum ModelSelector {
    Single(String),
    Candidates(Vec<String>),
}

impl ModelSelector {
    fn candidates(&self) -> Vec<&str> {
        match self {
            ModelSelector::Single(s) => vec![s.as_str()],
            ModelSelector::Candidates(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

pub struct ProviderRouter {
    registry: ProviderRegistry,
    providers_config: ProvidersConfig,
    warned_aliases: Mutex<HashSet<String>>,
}

impl ProviderRouter {
    pub fn new(registry: ProviderRegistry, providers_config: ProvidersConfig) -> Self {
        Self {
            registry,
            providers_config,
            warned_aliases: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a model spec to `(provider_id, model_name)` without
    /// dispatching a call. Exposed so the engine can log what it's about
    /// to try before attempting the request.
    pub fn resolve(&self, model_spec: &str) -> Result<(String, String)> {
        if let Some((prefix, rest)) = model_spec.split_once('/') {
            if self.registry.get(prefix).is_some() {
                return Ok((prefix.to_string(), rest.to_string()));
            }
        }

        for (provider_id, entry) in &self.providers_config.entries {
            if let Some(real_name) = entry.aliases.get(model_spec) {
                return Ok((provider_id.clone(), real_name.clone()));
            }
        }

        if let Some(default) = &self.providers_config.default {
            if self.registry.get(default).is_some() {
                return Ok((default.clone(), model_spec.to_string()));
            }
        }

        if model_spec.contains('/') {
            self.warn_once(model_spec, "no provider registered for this prefix and no default provider configured");
        } else {
            self.warn_once(model_spec, "no alias or default provider matched this model name");
        }

        Err(Error::Provider(format!("No model configured for \"{}\"", model_spec)))
    }

    fn warn_once(&self, model_spec: &str, reason: &str) {
        let mut warned = self.warned_aliases.lock().unwrap_or_else(|e| e.into_inner());
        if warned.insert(model_spec.to_string()) {
            tracing::warn!(model = %model_spec, reason, "unresolved model reference");
        }
    }

    /// Try each candidate in order, returning the first successful chat
    /// response. If every candidate fails to resolve or to complete, the
    /// error names all attempted candidates (§7's ProviderError taxonomy).
    pub async fn chat(
        &self,
        model: &ModelSelector,
        mut req: ChatRequest,
        on_stream_text: Option<&StreamTextCallback<'_>>,
    ) -> Result<ChatResponse> {
        let candidates = model.candidates();
        if candidates.is_empty() {
            return Err(Error::Provider("No model configured: empty candidate list".into()));
        }

        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_err: Option<Error> = None;

        for candidate in candidates {
            let (provider_id, model_name) = match self.resolve(candidate) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tried.push(candidate.to_string());
                    last_err = Some(e);
                    continue;
                }
            };

            let provider = match self.registry.get(&provider_id) {
                Some(p) if p.is_available() => p,
                _ => {
                    tried.push(format!("{}/{}", provider_id, model_name));
                    last_err = Some(Error::Provider(format!("provider \"{}\" is not available", provider_id)));
                    continue;
                }
            };

            req.model = model_name.clone();
            match provider.chat(&req, on_stream_text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::warn!(provider = %provider_id, model = %model_name, error = %e, "model call failed, trying next candidate");
                    tried.push(format!("{}/{}", provider_id, model_name));
                    last_err = Some(e);
                }
            }
        }

        Err(Error::Provider(format!(
            "No available model found for this request. Tried: {}{}",
            tried.join(", "),
            last_err.map(|e| format!(" (last error: {})", e)).unwrap_or_default()
        )))
    }
}
