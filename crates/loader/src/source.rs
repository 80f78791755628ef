//! Pluggable deck sources (§6). Two flavors ship with the core: a
//! structured, in-process registry (`CodeDeckSource`, the Rust analogue
//! of the spec's "structured module source" — Rust has no runtime module
//! loading, so decks are registered as literal values instead of files)
//! and a Markdown-with-TOML-front-matter source (`MarkdownDeckSource`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gambit_domain::error::{Error, Result};
use serde_json::Value as JsonValue;

use crate::frontmatter::parse_frontmatter;
use crate::types::{
    ActionDef, CardNode, DeckNode, EmbedRef, GuardrailsOverride, HandlerDef, Handlers, ModelParams, ModelSelector,
    SyntheticTools,
};
use crate::uri;

/// A source of deck/card definitions, keyed by path. `DeckSource`
/// implementations resolve both the root deck and every recursively
/// referenced action/embed path.
pub trait DeckSource: Send + Sync {
    /// Load a path as a full deck (used for the root deck and every
    /// `actions` target — every action points at another full deck).
    fn load_deck(&self, path: &str) -> Result<DeckNode>;

    /// Load a path as a card fragment (used for every `embeds` target).
    fn load_card(&self, path: &str) -> Result<CardNode>;
}

// ───────────────────────── Markdown + TOML front matter ─────────────────

pub struct MarkdownDeckSource;

impl MarkdownDeckSource {
    pub fn new() -> Self {
        MarkdownDeckSource
    }

    fn read(&self, path: &str) -> Result<(toml::Table, String)> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Load(format!("{}: {}", path, e)))?;
        let (table, body) = parse_frontmatter(&raw).map_err(|e| Error::Load(format!("{}: {}", path, e)))?;
        Ok((table.unwrap_or_default(), body))
    }
}

impl Default for MarkdownDeckSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckSource for MarkdownDeckSource {
    fn load_deck(&self, path: &str) -> Result<DeckNode> {
        let (table, body) = self.read(path)?;
        if table.contains_key("inputFragment") || table.contains_key("outputFragment") {
            return Err(Error::Load(format!(
                "{}: inputFragment/outputFragment are card-only keys, use inputSchema/outputSchema on a deck",
                path
            )));
        }

        let base = base_dir(path);
        let model_params = table.get("modelParams").map(parse_model_params).transpose()?;
        let handlers = parse_handlers(&table, &base)?;

        Ok(DeckNode {
            path: path.to_string(),
            label: string_field(&table, "label"),
            prompt: if body.trim().is_empty() { None } else { Some(body) },
            model_params,
            input_schema: load_schema_field(&table, "inputSchema", &base)?,
            output_schema: load_schema_field(&table, "outputSchema", &base)?,
            actions: parse_actions(&table, &base)?,
            embeds: parse_embeds(&table, &base)?,
            handlers,
            synthetic_tools: parse_synthetic_tools(&table),
            guardrails: parse_guardrails(&table),
            executor: None,
        })
    }

    fn load_card(&self, path: &str) -> Result<CardNode> {
        let (table, body) = self.read(path)?;
        if table.contains_key("handlers") {
            return Err(Error::Load(format!("{}: a card must not declare handlers", path)));
        }
        if table.contains_key("modelParams") {
            return Err(Error::Load(format!("{}: a card must not declare modelParams", path)));
        }

        let base = base_dir(path);
        Ok(CardNode {
            path: path.to_string(),
            label: string_field(&table, "label"),
            body: if body.trim().is_empty() { None } else { Some(body) },
            input_fragment: load_schema_field(&table, "inputFragment", &base)?,
            output_fragment: load_schema_field(&table, "outputFragment", &base)?,
            embeds: parse_embeds(&table, &base)?,
            actions: parse_actions(&table, &base)?,
        })
    }
}

fn base_dir(path: &str) -> PathBuf {
    Path::new(path).parent().map(Path::to_path_buf).unwrap_or_default()
}

fn string_field(table: &toml::Table, key: &str) -> Option<String> {
    table.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn resolve_relative(base: &Path, path: &str) -> String {
    if uri::is_gambit_uri(path) || Path::new(path).is_absolute() {
        path.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}

/// Schema fields accept either an inline TOML table (treated as a JSON
/// Schema document directly), a filesystem path to a `.json` schema file,
/// or a `gambit://` reference to a packaged schema.
fn load_schema_field(table: &toml::Table, key: &str, base: &Path) -> Result<Option<JsonValue>> {
    let Some(value) = table.get(key) else {
        return Ok(None);
    };
    match value {
        toml::Value::String(path) => {
            if uri::is_gambit_uri(path) {
                let content = uri::resolve(path)?;
                let parsed: JsonValue =
                    serde_json::from_str(content).map_err(|e| Error::Load(format!("{}: {}", path, e)))?;
                Ok(Some(parsed))
            } else {
                let resolved = resolve_relative(base, path);
                let content = std::fs::read_to_string(&resolved).map_err(|e| Error::Load(format!("{}: {}", resolved, e)))?;
                let parsed: JsonValue =
                    serde_json::from_str(&content).map_err(|e| Error::Load(format!("{}: {}", resolved, e)))?;
                Ok(Some(parsed))
            }
        }
        toml::Value::Table(_) => {
            let json = serde_json::to_value(value).map_err(|e| Error::Load(e.to_string()))?;
            Ok(Some(json))
        }
        other => Err(Error::Load(format!("{} must be a path string or inline table, got {:?}", key, other))),
    }
}

fn parse_embeds(table: &toml::Table, base: &Path) -> Result<Vec<EmbedRef>> {
    let Some(raw) = table.get("embeds") else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| Error::Load("embeds must be an array".to_string()))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        match item {
            toml::Value::String(p) => out.push(EmbedRef {
                path: resolve_relative(base, p),
                label: None,
            }),
            toml::Value::Table(t) => {
                let p = t
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Load("embeds entry missing path".to_string()))?;
                out.push(EmbedRef {
                    path: resolve_relative(base, p),
                    label: t.get("label").and_then(|v| v.as_str()).map(str::to_string),
                });
            }
            other => return Err(Error::Load(format!("invalid embeds entry: {:?}", other))),
        }
    }
    Ok(out)
}

fn parse_actions(table: &toml::Table, base: &Path) -> Result<Vec<ActionDef>> {
    let Some(raw) = table.get("actions") else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| Error::Load("actions must be an array".to_string()))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let t = item
            .as_table()
            .ok_or_else(|| Error::Load("actions entry must be a table".to_string()))?;
        let name = t
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Load("actions entry missing name".to_string()))?;
        crate::validate::assert_valid_action_name(name)?;
        let path = t
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Load(format!("action \"{}\" missing path", name)))?;
        out.push(ActionDef {
            name: name.to_string(),
            path: resolve_relative(base, path),
            description: t.get("description").and_then(|v| v.as_str()).map(str::to_string),
        });
    }
    Ok(out)
}

fn parse_model_params(raw: &toml::Value) -> Result<ModelParams> {
    let t = raw
        .as_table()
        .ok_or_else(|| Error::Load("modelParams must be a table".to_string()))?;
    let model = match t.get("model") {
        None => None,
        Some(toml::Value::String(s)) => Some(ModelSelector::Single(s.clone())),
        Some(toml::Value::Array(arr)) => {
            let candidates: Result<Vec<String>> = arr
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Error::Load("modelParams.model candidates must be strings".to_string()))
                })
                .collect();
            Some(ModelSelector::Candidates(candidates?))
        }
        Some(other) => return Err(Error::Load(format!("modelParams.model has invalid shape: {:?}", other))),
    };
    let temperature = t.get("temperature").and_then(|v| v.as_float());
    let mut extra = t.clone();
    extra.remove("model");
    extra.remove("temperature");
    let extra_json = serde_json::to_value(extra).map_err(|e| Error::Load(e.to_string()))?;
    Ok(ModelParams { model, temperature, extra: extra_json })
}

fn parse_handler_def(raw: &toml::Value, base: &Path) -> Result<HandlerDef> {
    let t = raw
        .as_table()
        .ok_or_else(|| Error::Load("handler entry must be a table".to_string()))?;
    let path = t
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Load("handler entry missing path".to_string()))?;
    Ok(HandlerDef {
        path: resolve_relative(base, path),
        delay_ms: t.get("delayMs").and_then(|v| v.as_integer()).map(|v| v as u64),
        repeat_ms: t.get("repeatMs").and_then(|v| v.as_integer()).map(|v| v as u64),
    })
}

fn parse_handlers(table: &toml::Table, base: &Path) -> Result<Handlers> {
    let Some(raw) = table.get("handlers") else {
        return Ok(Handlers::default());
    };
    let t = raw
        .as_table()
        .ok_or_else(|| Error::Load("handlers must be a table".to_string()))?;

    let on_error = t.get("onError").map(|v| parse_handler_def(v, base)).transpose()?;

    // onInterval is a deprecated alias of onBusy (§4.6.5, §9 open questions).
    let on_busy = match t.get("onBusy").or_else(|| t.get("onInterval")) {
        Some(v) => Some(parse_handler_def(v, base)?),
        None => None,
    };
    let on_idle = t.get("onIdle").map(|v| parse_handler_def(v, base)).transpose()?;

    Ok(Handlers { on_error, on_busy, on_idle })
}

fn parse_synthetic_tools(table: &toml::Table) -> SyntheticTools {
    let respond = table
        .get("syntheticTools")
        .and_then(|v| v.as_table())
        .and_then(|t| t.get("respond"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    SyntheticTools { respond }
}

fn parse_guardrails(table: &toml::Table) -> GuardrailsOverride {
    let Some(t) = table.get("guardrails").and_then(|v| v.as_table()) else {
        return GuardrailsOverride::default();
    };
    GuardrailsOverride {
        max_depth: t.get("maxDepth").and_then(|v| v.as_integer()).map(|v| v as u32),
        max_passes: t.get("maxPasses").and_then(|v| v.as_integer()).map(|v| v as u32),
        timeout_ms: t.get("timeoutMs").and_then(|v| v.as_integer()).map(|v| v as u64),
    }
}

// ───────────────────────── In-process code registry ──────────────────────

/// An in-process registry of deck/card builders keyed by logical path.
/// The Rust analogue of the spec's "structured module source": since
/// Rust has no dynamic module loading, decks authored in Rust register
/// themselves here instead of being discovered from a file tree.
#[derive(Default)]
pub struct CodeDeckSource {
    decks: HashMap<String, DeckNode>,
    cards: HashMap<String, CardNode>,
}

impl CodeDeckSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_deck(&mut self, path: impl Into<String>, node: DeckNode) -> &mut Self {
        self.decks.insert(path.into(), node);
        self
    }

    pub fn register_card(&mut self, path: impl Into<String>, node: CardNode) -> &mut Self {
        self.cards.insert(path.into(), node);
        self
    }
}

impl DeckSource for CodeDeckSource {
    fn load_deck(&self, path: &str) -> Result<DeckNode> {
        self.decks
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Load(format!("no deck registered at \"{}\"", path)))
    }

    fn load_card(&self, path: &str) -> Result<CardNode> {
        self.cards
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Load(format!("no card registered at \"{}\"", path)))
    }
}
