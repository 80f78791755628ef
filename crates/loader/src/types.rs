use std::collections::HashMap;

use gambit_domain::executor::DeckExecutor;
use serde_json::Value;

/// A model id, or an ordered list of candidates the router tries in turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    Single(String),
    Candidates(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ModelParams {
    pub model: Option<ModelSelector>,
    pub temperature: Option<f64>,
    /// Free-form extra params (e.g. `reasoning.effort`) passed through to
    /// the provider verbatim.
    pub extra: Value,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            model: None,
            temperature: None,
            extra: Value::Object(Default::default()),
        }
    }
}

/// One entry in a deck's `actions` list: a named child deck the model may
/// call as a tool.
#[derive(Debug, Clone)]
pub struct ActionDef {
    pub name: String,
    pub path: String,
    pub description: Option<String>,
}

/// A reference to an embedded card, before resolution.
#[derive(Debug, Clone)]
pub struct EmbedRef {
    pub path: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HandlerDef {
    pub path: String,
    pub delay_ms: Option<u64>,
    pub repeat_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Handlers {
    pub on_error: Option<HandlerDef>,
    pub on_busy: Option<HandlerDef>,
    pub on_idle: Option<HandlerDef>,
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticTools {
    pub respond: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GuardrailsOverride {
    pub max_depth: Option<u32>,
    pub max_passes: Option<u32>,
    pub timeout_ms: Option<u64>,
}

/// A raw deck node, as returned by a `DeckSource` before recursive
/// resolution. Used both for the root deck and for every path named in an
/// `actions` entry (every action target is itself a full deck).
#[derive(Clone)]
pub struct DeckNode {
    pub path: String,
    pub label: Option<String>,
    pub prompt: Option<String>,
    pub model_params: Option<ModelParams>,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub actions: Vec<ActionDef>,
    pub embeds: Vec<EmbedRef>,
    pub handlers: Handlers,
    pub synthetic_tools: SyntheticTools,
    pub guardrails: GuardrailsOverride,
    pub executor: Option<DeckExecutor>,
}

/// A raw card node: a prompt/schema fragment embedded into one or more
/// decks. Structurally forbidden from carrying handlers, model params, or
/// an executor — the loader rejects a source that tries to sneak one in.
#[derive(Debug, Clone)]
pub struct CardNode {
    pub path: String,
    pub label: Option<String>,
    pub body: Option<String>,
    pub input_fragment: Option<Value>,
    pub output_fragment: Option<Value>,
    pub embeds: Vec<EmbedRef>,
    pub actions: Vec<ActionDef>,
}

/// The fully resolved result of loading a deck graph: cards flattened,
/// actions and schemas merged (deck wins over card on name collision).
#[derive(Clone)]
pub struct LoadedDeck {
    pub path: String,
    pub label: Option<String>,
    /// Absolute paths of every card folded into this deck, in embed order.
    pub cards: Vec<String>,
    /// The merged system prompt: deck body, then each flattened card body,
    /// each trimmed, joined by blank lines.
    pub prompt: String,
    pub model_params: Option<ModelParams>,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    /// Name -> action, post-merge (deck's own action wins over a card's
    /// same-named action).
    pub actions: HashMap<String, ActionDef>,
    pub handlers: Handlers,
    pub synthetic_tools: SyntheticTools,
    pub guardrails: GuardrailsOverride,
    pub executor: Option<DeckExecutor>,
}

impl LoadedDeck {
    pub fn is_compute_deck(&self) -> bool {
        self.executor.is_some()
            && self
                .model_params
                .as_ref()
                .map(|m| m.model.is_none() && m.temperature.is_none())
                .unwrap_or(true)
    }
}
