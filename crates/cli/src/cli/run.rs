//! `gambit run` — one-shot execution command.
//!
//! Boots a `RunContext` wired to a file-backed deck source, an empty
//! provider registry (concrete adapters are outside the core's scope —
//! see the provider interface docs), and a session-backed trace sink, then
//! drives a single root `run_deck` invocation and prints the result.

use std::path::Path;
use std::sync::Arc;

use gambit_artifacts::SessionArtifactStore;
use gambit_domain::config::Config;
use gambit_domain::trace::TraceSink;
use gambit_engine::{run_deck, RunContext, RunInput, SavedState};
use gambit_loader::MarkdownDeckSource;
use gambit_providers::{ProviderRegistry, ProviderRouter};
use serde_json::Value;

pub struct RunArgs {
    pub deck: String,
    pub message: Option<String>,
    pub init: Option<String>,
    pub session: Option<String>,
}

/// Execute a single root deck run and print its result.
///
/// Returns the process exit code: `0` on success, `1` if the run fails.
pub async fn run(config: &Config, args: RunArgs) -> anyhow::Result<i32> {
    let registry = ProviderRegistry::new();
    if registry.is_empty() {
        tracing::warn!("no providers registered; model calls will fail");
    }
    let router = Arc::new(ProviderRouter::new(registry, config.providers.clone()));
    let deck_source = Arc::new(MarkdownDeckSource::new());

    let session_id = args.session.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let continue_session = args.session.is_some();
    let store = Arc::new(SessionArtifactStore::acquire(
        Path::new(&config.artifacts.root_dir),
        &session_id,
        continue_session,
        None,
    )?);

    let initial_state = store.initial_state();
    let store_for_update = store.clone();
    let store_trace: Arc<dyn TraceSink> = store.clone();

    let mut ctx = RunContext::new(deck_source, router, store_trace);
    ctx.project_guardrails = config.guardrails.clone();
    ctx.on_state_update = Some(Arc::new(move |s: &SavedState| store_for_update.record_state(s)));

    // A non-JSON `--init` value is passed through as a bare string; the
    // engine's root-input handling (`allow_root_string_input` below) is
    // what actually reconciles it against the deck's input schema.
    let init_input = match &args.init {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        None => Value::Null,
    };

    let run_id = initial_state.as_ref().map(|s| s.run_id.clone()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = run_deck(
        Arc::new(ctx),
        RunInput {
            path: args.deck.clone(),
            run_id,
            action_call_id: uuid::Uuid::new_v4().to_string(),
            parent_action_call_id: None,
            depth: 0,
            input: init_input,
            is_root: true,
            state: initial_state,
            initial_user_message: args.message,
            allow_root_string_input: true,
        },
    )
    .await;

    store.persist_latest()?;
    store.finalize();

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(1)
        }
    }
}
