//! Tool-call dispatch (§4.6.1–§4.6.3).
//!
//! Resolves a model's tool call to a declared action, recurses into the
//! named child deck — racing a busy-handler timer alongside so a slow
//! child doesn't leave the caller silent — and normalizes whatever comes
//! back (a value, or a swallowed error) into the envelope every tool
//! message carries as its `content`.

use std::sync::Arc;
use std::time::Duration;

use gambit_domain::envelope::Envelope;
use gambit_domain::error::{Error, Result};
use gambit_domain::tool::{Message, ToolCall};
use gambit_domain::trace::{LogLevel, TraceEvent};
use gambit_loader::LoadedDeck;
use serde_json::Value;

use crate::context::RunContext;
use crate::guardrails::DEFAULT_BUSY_DELAY_MS;
use crate::idle::{race_with_timer, ActivityClock};
use crate::run::{run_deck, RunInput};
use crate::synthetic::{complete_pair, new_call_id};

/// Everything a completed dispatch contributes to the ongoing
/// conversation: the tool-result content for the original call, plus any
/// busy-note assistant messages and the trailing `gambit_complete` pair
/// (absent for the unknown-action short-circuit, since no recursion
/// actually happened).
pub struct DispatchOutcome {
    pub tool_content: String,
    pub busy_notes: Vec<String>,
    pub complete_pair: Option<(Message, Message)>,
}

#[allow(clippy::too_many_arguments)]
pub async fn dispatch_tool_call(
    ctx: &Arc<RunContext>,
    parent: &LoadedDeck,
    run_id: &str,
    parent_action_call_id: &str,
    depth: u32,
    call: &ToolCall,
    idle: &ActivityClock,
) -> Result<DispatchOutcome> {
    let Some(action) = parent.actions.get(&call.name) else {
        let envelope = Envelope::unknown_action(
            run_id,
            new_call_id(),
            Some(parent_action_call_id.to_string()),
            parent.path.clone(),
            call.name.clone(),
        );
        ctx.trace.emit(TraceEvent::Log {
            run_id: run_id.to_string(),
            action_call_id: Some(parent_action_call_id.to_string()),
            level: LogLevel::Warn,
            title: Some("unknown action".to_string()),
            message: format!("deck \"{}\" has no action \"{}\"", parent.path, call.name),
            body: Value::Null,
            meta: None,
        });
        return Ok(DispatchOutcome { tool_content: envelope.to_tool_content(), busy_notes: Vec::new(), complete_pair: None });
    };

    let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
    let action_call_id = new_call_id();

    idle.pause();
    let (result, busy_notes) =
        run_with_busy_handler(ctx, parent, run_id, &action_call_id, parent_action_call_id, depth, &action.path, call, &args).await;
    idle.resume();

    match result {
        Ok(value) => {
            let envelope = Envelope::from_child_result(
                run_id,
                action_call_id.clone(),
                Some(parent_action_call_id.to_string()),
                action.path.clone(),
                call.name.clone(),
                value,
            );
            let content = envelope.to_tool_content();
            let pair = complete_pair(&new_call_id(), &content);
            Ok(DispatchOutcome { tool_content: content, busy_notes, complete_pair: Some(pair) })
        }
        Err(err) => match &parent.handlers.on_error {
            None => Err(err),
            Some(handler) => {
                let envelope = run_error_handler(
                    ctx,
                    parent,
                    run_id,
                    &action_call_id,
                    parent_action_call_id,
                    depth,
                    &action.path,
                    call,
                    &args,
                    &handler.path,
                    &err,
                )
                .await;
                let content = envelope.to_tool_content();
                let pair = complete_pair(&new_call_id(), &content);
                Ok(DispatchOutcome { tool_content: content, busy_notes, complete_pair: Some(pair) })
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_with_busy_handler(
    ctx: &Arc<RunContext>,
    parent: &LoadedDeck,
    run_id: &str,
    action_call_id: &str,
    parent_action_call_id: &str,
    depth: u32,
    action_path: &str,
    call: &ToolCall,
    args: &Value,
) -> (Result<Value>, Vec<String>) {
    let child_fut = run_deck(
        ctx.clone(),
        RunInput {
            path: action_path.to_string(),
            run_id: run_id.to_string(),
            action_call_id: action_call_id.to_string(),
            parent_action_call_id: Some(parent_action_call_id.to_string()),
            depth,
            input: args.clone(),
            is_root: false,
            state: None,
            initial_user_message: None,
            allow_root_string_input: false,
        },
    );

    let Some(handler) = &parent.handlers.on_busy else {
        return (child_fut.await, Vec::new());
    };

    let delay = Duration::from_millis(handler.delay_ms.unwrap_or(DEFAULT_BUSY_DELAY_MS));
    let repeat = handler.repeat_ms.map(Duration::from_millis);

    let notes: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let notes_fire = notes.clone();
    let ctx_fire = ctx.clone();
    let parent_path = parent.path.clone();
    let parent_label = parent.label.clone();
    let call_name = call.name.clone();
    let args_fire = args.clone();
    let handler_path = handler.path.clone();
    let run_id_fire = run_id.to_string();
    let action_call_id_fire = action_call_id.to_string();

    let result = race_with_timer(child_fut, delay, repeat, move |elapsed| {
        let ctx_fire = ctx_fire.clone();
        let parent_path = parent_path.clone();
        let parent_label = parent_label.clone();
        let call_name = call_name.clone();
        let args_fire = args_fire.clone();
        let handler_path = handler_path.clone();
        let run_id_fire = run_id_fire.clone();
        let action_call_id_fire = action_call_id_fire.clone();
        let notes_fire = notes_fire.clone();
        async move {
            if let Some(note) = fire_busy_handler(
                &ctx_fire,
                &run_id_fire,
                &action_call_id_fire,
                depth,
                &parent_path,
                parent_label.as_deref(),
                &call_name,
                &args_fire,
                &handler_path,
                elapsed,
            )
            .await
            {
                notes_fire.lock().unwrap_or_else(|e| e.into_inner()).push(note);
            }
        }
    })
    .await;

    let collected = notes.lock().unwrap_or_else(|e| e.into_inner()).clone();
    (result, collected)
}

#[allow(clippy::too_many_arguments)]
async fn fire_busy_handler(
    ctx: &Arc<RunContext>,
    run_id: &str,
    parent_action_call_id: &str,
    depth: u32,
    deck_path: &str,
    deck_label: Option<&str>,
    action_name: &str,
    child_input: &Value,
    handler_path: &str,
    elapsed_ms: u64,
) -> Option<String> {
    let input = serde_json::json!({
        "kind": "busy",
        "label": deck_label,
        "source": { "deckPath": deck_path, "actionName": action_name },
        "trigger": { "reason": "timeout", "elapsedMs": elapsed_ms },
        "childInput": child_input,
    });
    let result = run_deck(
        ctx.clone(),
        RunInput {
            path: handler_path.to_string(),
            run_id: run_id.to_string(),
            action_call_id: new_call_id(),
            parent_action_call_id: Some(parent_action_call_id.to_string()),
            depth: depth + 1,
            input,
            is_root: false,
            state: None,
            initial_user_message: None,
            allow_root_string_input: false,
        },
    )
    .await;

    let message = match result {
        Ok(value) => extract_handler_message(&value),
        Err(e) => {
            tracing::warn!(error = %e, "busy handler failed");
            return None;
        }
    };
    let note = format!("{} (elapsed {}ms)", message, elapsed_ms);
    match &ctx.on_stream_text {
        Some(cb) => cb(&note),
        None => ctx.trace.emit(TraceEvent::Log {
            run_id: run_id.to_string(),
            action_call_id: Some(parent_action_call_id.to_string()),
            level: LogLevel::Info,
            title: Some("busy".to_string()),
            message: note.clone(),
            body: Value::Null,
            meta: None,
        }),
    }
    Some(note)
}

#[allow(clippy::too_many_arguments)]
async fn run_error_handler(
    ctx: &Arc<RunContext>,
    parent: &LoadedDeck,
    run_id: &str,
    action_call_id: &str,
    parent_action_call_id: &str,
    depth: u32,
    action_path: &str,
    call: &ToolCall,
    args: &Value,
    handler_path: &str,
    original_error: &Error,
) -> Envelope {
    let handler_input = serde_json::json!({
        "kind": "error",
        "label": parent.label,
        "source": { "deckPath": parent.path, "actionName": call.name },
        "error": { "message": original_error.to_string() },
        "childInput": args,
    });

    let handler_run = run_deck(
        ctx.clone(),
        RunInput {
            path: handler_path.to_string(),
            run_id: run_id.to_string(),
            action_call_id: new_call_id(),
            parent_action_call_id: Some(action_call_id.to_string()),
            depth: depth + 1,
            input: handler_input.clone(),
            is_root: false,
            state: None,
            initial_user_message: None,
            allow_root_string_input: false,
        },
    )
    .await;

    match handler_run {
        Ok(value) => {
            let mut envelope = Envelope::from_child_result(
                run_id,
                action_call_id.to_string(),
                Some(parent_action_call_id.to_string()),
                action_path.to_string(),
                call.name.clone(),
                value,
            );
            if envelope.status.is_none() {
                envelope.status = Some(500);
            }
            envelope
        }
        Err(handler_err) => Envelope::handler_fallback(
            run_id,
            action_call_id.to_string(),
            Some(parent_action_call_id.to_string()),
            action_path.to_string(),
            call.name.clone(),
            handler_err,
            handler_input,
        ),
    }
}

/// A handler deck's return value may be a bare string or an object
/// carrying `message`; either way we want one line of text for the note
/// appended to history (§4.6.1, §4.6.5).
pub(crate) fn extract_handler_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
