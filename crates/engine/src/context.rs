//! Shared, run-spanning configuration. One `RunContext` is built by the
//! caller and handed to every recursive `run_deck` invocation via `Arc`
//! clone — cheap, and avoids threading a dozen individual arguments
//! through every recursion site.

use std::sync::Arc;

use gambit_domain::config::GuardrailsConfig;
use gambit_domain::trace::TraceSink;
use gambit_loader::DeckSource;
use gambit_providers::ProviderRouter;

use crate::state::SavedState;

pub type StateUpdateFn = Arc<dyn Fn(&SavedState) + Send + Sync>;
pub type StreamTextFn = Arc<dyn Fn(&str) + Send + Sync>;

pub struct RunContext {
    pub deck_source: Arc<dyn DeckSource>,
    pub router: Arc<ProviderRouter>,
    pub trace: Arc<dyn TraceSink>,
    pub project_guardrails: GuardrailsConfig,
    /// Used when a deck's `modelParams.model` is absent.
    pub default_model: Option<String>,
    /// Forces every deck in this run onto one model, ignoring
    /// `modelParams.model` and `default_model` alike.
    pub model_override: Option<String>,
    pub on_state_update: Option<StateUpdateFn>,
    pub stream: bool,
    pub on_stream_text: Option<StreamTextFn>,
}

impl RunContext {
    pub fn new(deck_source: Arc<dyn DeckSource>, router: Arc<ProviderRouter>, trace: Arc<dyn TraceSink>) -> Self {
        RunContext {
            deck_source,
            router,
            trace,
            project_guardrails: GuardrailsConfig::default(),
            default_model: None,
            model_override: None,
            on_state_update: None,
            stream: false,
            on_stream_text: None,
        }
    }
}
