use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration, loaded from `gambit.toml` (or the path named
/// by `GAMBIT_CONFIG`). Mirrors the teacher's per-concern config sections
/// (`[providers]`, `[guardrails]`, ...) but scoped to what the core
/// actually needs: provider routing, run guardrails, and the artifact
/// store's root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider id -> settings. Id doubles as the routing prefix
    /// (`"openai/gpt-4o"` routes to the provider registered as `"openai"`).
    #[serde(default)]
    pub entries: HashMap<String, ProviderEntry>,
    /// Provider id to fall back to when a model name has no recognized
    /// prefix and no alias matches.
    #[serde(default)]
    pub default: Option<String>,
    /// Legacy compatibility knob carried over from project config files
    /// that predate the router's alias system. Accepts
    /// `"openrouter"|"ollama"|"google"|"codex-cli"|"none"`; any other
    /// value is a warning, and `"codex"` specifically is rejected outright
    /// since the legacy codex integration this crate superseded is gone.
    #[serde(default)]
    pub fallback: Option<String>,
}

const KNOWN_FALLBACKS: &[&str] = &["openrouter", "ollama", "google", "codex-cli", "none"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    /// Name of the environment variable holding the API key. Never the
    /// key itself — config files are often checked into version control.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model aliases this provider resolves, e.g. `"fast"` -> `"gpt-4o-mini"`.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    /// A provider reachable through an OpenAI-compatible HTTP surface
    /// (local runners, third-party gateways).
    Compatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Hard cap on model-turn iterations within a single deck run.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Hard cap on recursion depth across nested deck runs.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Milliseconds of inactivity before `onIdle` fires.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Milliseconds a single model or tool call may run before `onBusy` fires.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_max_turns() -> u32 {
    50
}
fn default_max_depth() -> u32 {
    10
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}
fn default_busy_timeout_ms() -> u64 {
    120_000
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        GuardrailsConfig {
            max_turns: default_max_turns(),
            max_depth: default_max_depth(),
            idle_timeout_ms: default_idle_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Root directory sessions are written under. Each run gets a
    /// subdirectory named by its run id.
    #[serde(default = "default_artifacts_root")]
    pub root_dir: String,
}

fn default_artifacts_root() -> String {
    ".gambit/sessions".to_string()
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        ArtifactsConfig {
            root_dir: default_artifacts_root(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            providers: ProvidersConfig::default(),
            guardrails: GuardrailsConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

/// Severity of a configuration validation finding. Warnings are reported
/// but don't block startup; errors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

impl Config {
    /// Load configuration from a TOML file. Returns `Config::default()`
    /// unmodified if `path` doesn't exist, matching the teacher's CLI
    /// loader behavior (`load_config`).
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Validate cross-field invariants that serde alone can't express.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.providers.entries.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "no providers configured; model calls will fail".to_string(),
            });
        }

        if let Some(default) = &self.providers.default {
            if !self.providers.entries.contains_key(default) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    message: format!("providers.default references unknown provider \"{}\"", default),
                });
            }
        }

        if let Some(fallback) = &self.providers.fallback {
            if fallback == "codex" {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    message: "providers.fallback \"codex\" is no longer supported".to_string(),
                });
            } else if !KNOWN_FALLBACKS.contains(&fallback.as_str()) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    message: format!("providers.fallback \"{}\" is not a recognized value", fallback),
                });
            }
        }

        if self.guardrails.max_turns == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "guardrails.max_turns must be at least 1".to_string(),
            });
        }

        if self.guardrails.max_depth == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "guardrails.max_depth must be at least 1".to_string(),
            });
        }

        issues
    }
}
