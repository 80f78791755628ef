//! The trace sink (C3): a typed event stream emitted by the run engine.
//!
//! Mirrors the teacher's single flat `#[serde(tag = "event")]` enum with an
//! `emit()` convenience method, but the variant set is the one the run
//! engine's turn loop actually produces, and delivery goes through the
//! pluggable [`TraceSink`] trait rather than always going straight to
//! `tracing`. `TracingSink` reproduces the teacher's exact default
//! behavior for callers that don't supply their own sink.

use serde::Serialize;
use serde_json::Value;

/// Log level for the `log` trace variant (user-emitted diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured trace events emitted by the run engine.
///
/// Every variant carries `run_id`. Deck and tool/action events additionally
/// carry `action_call_id` and, except at the root, `parent_action_call_id`
/// — together these form the trace tree testable property 11 checks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    #[serde(rename = "run.start")]
    RunStart { run_id: String, deck_path: String },

    #[serde(rename = "run.end")]
    RunEnd {
        run_id: String,
        ok: bool,
        error: Option<String>,
    },

    #[serde(rename = "deck.start")]
    DeckStart {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        deck_path: String,
        depth: u32,
    },

    #[serde(rename = "deck.end")]
    DeckEnd {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        deck_path: String,
        ok: bool,
    },

    #[serde(rename = "action.start")]
    ActionStart {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        action_name: String,
        tool_call_id: String,
    },

    #[serde(rename = "action.end")]
    ActionEnd {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        action_name: String,
        tool_call_id: String,
        ok: bool,
    },

    #[serde(rename = "tool.call")]
    ToolCall {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },

    #[serde(rename = "tool.result")]
    ToolResult {
        run_id: String,
        action_call_id: String,
        parent_action_call_id: Option<String>,
        tool_call_id: String,
        tool_name: String,
        content: String,
    },

    #[serde(rename = "model.call")]
    ModelCall {
        run_id: String,
        action_call_id: String,
        model: String,
        message_count: usize,
        tool_count: usize,
    },

    #[serde(rename = "model.result")]
    ModelResult {
        run_id: String,
        action_call_id: String,
        model: String,
        finish_reason: String,
        tool_call_count: usize,
    },

    #[serde(rename = "model.stream.event")]
    ModelStreamEvent {
        run_id: String,
        action_call_id: String,
        event: Value,
    },

    #[serde(rename = "log")]
    Log {
        run_id: String,
        action_call_id: Option<String>,
        level: LogLevel,
        title: Option<String>,
        message: String,
        body: Value,
        meta: Option<Value>,
    },

    #[serde(rename = "monolog")]
    Monolog {
        run_id: String,
        action_call_id: String,
        content: String,
    },
}

impl TraceEvent {
    /// The `run_id` carried by every variant.
    pub fn run_id(&self) -> &str {
        match self {
            TraceEvent::RunStart { run_id, .. }
            | TraceEvent::RunEnd { run_id, .. }
            | TraceEvent::DeckStart { run_id, .. }
            | TraceEvent::DeckEnd { run_id, .. }
            | TraceEvent::ActionStart { run_id, .. }
            | TraceEvent::ActionEnd { run_id, .. }
            | TraceEvent::ToolCall { run_id, .. }
            | TraceEvent::ToolResult { run_id, .. }
            | TraceEvent::ModelCall { run_id, .. }
            | TraceEvent::ModelResult { run_id, .. }
            | TraceEvent::ModelStreamEvent { run_id, .. }
            | TraceEvent::Log { run_id, .. }
            | TraceEvent::Monolog { run_id, .. } => run_id,
        }
    }
}

/// A pluggable trace sink. Delivery is best-effort, synchronous, and must
/// never panic or propagate an error back into the engine — a tracer that
/// throws would otherwise abort an unrelated run.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

/// Default sink: forwards every event to `tracing::info!` as a JSON blob,
/// exactly as the teacher's `TraceEvent::emit` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, event: TraceEvent) {
        let json = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(trace_event = %json, "gambit_event");
    }
}

/// An in-memory sink for tests: collects every event it receives in order.
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, event: TraceEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}
