//! Shared types for compute decks: decks with an inline `run` function
//! instead of a model. Declared in the leaf crate so both the deck loader
//! (which carries a deck's executor) and the run engine (which invokes
//! it and supplies the spawn/log callbacks) can depend on the same type
//! without a cycle between them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request to recurse into a child deck, issued by a compute deck via
/// `ExecutionContext::spawn_and_wait`. Mirrors the fields a tool-call
/// dispatch would pass the engine's `runDeck`.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub path: String,
    pub input: Value,
}

/// Callback the engine supplies so a compute deck can recurse without the
/// loader or domain crate depending on the engine.
pub type SpawnFn = Arc<dyn Fn(SpawnRequest) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Callback the engine supplies for a compute deck to emit a `log` trace
/// event without holding a reference to the engine's trace sink directly.
pub type LogFn = Arc<dyn Fn(Value) + Send + Sync>;

/// The context handed to a compute deck's executor. Fields mirror the
/// engine's own bookkeeping for an LLM deck invocation so the two deck
/// kinds are traceable the same way.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub action_call_id: String,
    pub parent_action_call_id: Option<String>,
    pub depth: u32,
    pub input: Value,
    pub label: Option<String>,
    spawn: SpawnFn,
    log: LogFn,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<String>,
        action_call_id: impl Into<String>,
        parent_action_call_id: Option<String>,
        depth: u32,
        input: Value,
        label: Option<String>,
        spawn: SpawnFn,
        log: LogFn,
    ) -> Self {
        ExecutionContext {
            run_id: run_id.into(),
            action_call_id: action_call_id.into(),
            parent_action_call_id,
            depth,
            input,
            label,
            spawn,
            log,
        }
    }

    /// Recurse into a child deck and wait for its result. Resolves the
    /// child path relative to this context's own deck (the caller passes
    /// an already-resolved path).
    pub async fn spawn_and_wait(&self, path: impl Into<String>, input: Value) -> Result<Value, Error> {
        (self.spawn)(SpawnRequest { path: path.into(), input }).await
    }

    /// Emit a structured `log` entry for this deck invocation.
    pub fn log(&self, entry: Value) {
        (self.log)(entry);
    }
}

/// A compute deck's inline executor. Takes an `ExecutionContext` and
/// returns the deck's raw output value (validated against the output
/// schema by the caller, not the executor itself).
pub type DeckExecutor = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;
