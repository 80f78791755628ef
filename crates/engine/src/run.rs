//! The run engine (C5): the recursive deck turn loop (§4.6).
//!
//! `run_deck` is the single recursion point for the whole engine — a
//! compute deck's executor recurses back into it via
//! `ExecutionContext::spawn_and_wait`, and an LLM deck's tool dispatch
//! recurses into it via [`crate::dispatch::dispatch_tool_call`]. It
//! returns a boxed future (rather than being declared `async fn`) because
//! an `async fn` cannot call itself without infinite-sizing its own state
//! machine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use gambit_domain::error::{Error, Result};
use gambit_domain::executor::{BoxFuture, ExecutionContext, LogFn, SpawnFn, SpawnRequest};
use gambit_domain::stream::FinishReason;
use gambit_domain::tool::{Message, ToolDefinition};
use gambit_domain::trace::{LogLevel, TraceEvent};
use gambit_loader::{load_deck, LoadedDeck, ModelSelector as LoaderModelSelector};
use gambit_providers::{ChatRequest, ModelSelector as ProviderModelSelector};
use serde_json::Value;

use crate::context::RunContext;
use crate::dispatch::dispatch_tool_call;
use crate::guardrails::{check_passes, EffectiveGuardrails};
use crate::idle::{race_with_timer, ActivityClock};
use crate::state::{sanitize, SavedState};
use crate::synthetic::{init_pair, new_call_id, respond_tool_definition, GAMBIT_RESPOND};

/// One recursive invocation of a deck: the root run, a dispatched action,
/// or a busy/error handler all go through this shape.
pub struct RunInput {
    pub path: String,
    pub run_id: String,
    pub action_call_id: String,
    pub parent_action_call_id: Option<String>,
    pub depth: u32,
    pub input: Value,
    pub is_root: bool,
    /// A previously persisted conversation to continue, rather than
    /// starting fresh with a `gambit_init` pair.
    pub state: Option<SavedState>,
    /// Appended as a trailing `user` message after the `gambit_init` pair
    /// on a fresh (non-resumed) run. Always `None` on recursive calls —
    /// only the root invocation seeds one (§4.6 step 2).
    pub initial_user_message: Option<String>,
    /// When the root deck's raw input is a string but its declared input
    /// schema is not string-shaped, fall back to the original string on
    /// validation failure instead of rejecting the run (§4.1). Only
    /// meaningful for the root invocation; always `false` on recursive
    /// calls, since a child action's arguments are never a bare string.
    pub allow_root_string_input: bool,
}

pub fn run_deck(ctx: Arc<RunContext>, input: RunInput) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> {
    Box::pin(run_deck_inner(ctx, input))
}

async fn run_deck_inner(ctx: Arc<RunContext>, input: RunInput) -> Result<Value> {
    let RunInput {
        path,
        run_id,
        action_call_id,
        parent_action_call_id,
        depth,
        input: deck_input,
        is_root,
        state,
        initial_user_message,
        allow_root_string_input,
    } = input;

    ctx.trace.emit(TraceEvent::DeckStart {
        run_id: run_id.clone(),
        action_call_id: action_call_id.clone(),
        parent_action_call_id: parent_action_call_id.clone(),
        deck_path: path.clone(),
        depth,
    });

    let result = run_deck_body(
        &ctx,
        &run_id,
        &action_call_id,
        parent_action_call_id.clone(),
        depth,
        &path,
        deck_input,
        is_root,
        state,
        initial_user_message,
        allow_root_string_input,
    )
    .await;

    ctx.trace.emit(TraceEvent::DeckEnd {
        run_id: run_id.clone(),
        action_call_id: action_call_id.clone(),
        parent_action_call_id,
        deck_path: path,
        ok: result.is_ok(),
    });

    if is_root {
        ctx.trace.emit(TraceEvent::RunEnd {
            run_id,
            ok: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_deck_body(
    ctx: &Arc<RunContext>,
    run_id: &str,
    action_call_id: &str,
    parent_action_call_id: Option<String>,
    depth: u32,
    path: &str,
    deck_input: Value,
    is_root: bool,
    state: Option<SavedState>,
    initial_user_message: Option<String>,
    allow_root_string_input: bool,
) -> Result<Value> {
    let deck = load_deck(&*ctx.deck_source, path, is_root)?;
    let effective = EffectiveGuardrails::resolve(&deck.guardrails, &ctx.project_guardrails);

    if depth > effective.max_depth {
        return Err(Error::Guardrail("Max depth exceeded".to_string()));
    }

    let deck_input = match (&deck_input, is_root) {
        (Value::String(raw), true) => {
            gambit_schema::validate_root_string_input(deck.input_schema.as_ref(), raw, allow_root_string_input)?
        }
        _ => {
            if let Some(schema) = &deck.input_schema {
                gambit_schema::validate(schema, &deck_input)?;
            }
            deck_input
        }
    };

    if deck.is_compute_deck() {
        return run_compute_deck(ctx, run_id, action_call_id, parent_action_call_id, depth, &deck, deck_input).await;
    }

    run_llm_deck(
        ctx,
        run_id,
        action_call_id,
        parent_action_call_id,
        depth,
        &deck,
        deck_input,
        state,
        initial_user_message,
        effective,
    )
    .await
}

async fn run_compute_deck(
    ctx: &Arc<RunContext>,
    run_id: &str,
    action_call_id: &str,
    parent_action_call_id: Option<String>,
    depth: u32,
    deck: &LoadedDeck,
    deck_input: Value,
) -> Result<Value> {
    let spawn: SpawnFn = {
        let ctx = ctx.clone();
        let run_id = run_id.to_string();
        let action_call_id = action_call_id.to_string();
        let depth = depth;
        Arc::new(move |req: SpawnRequest| -> BoxFuture<'static, std::result::Result<Value, Error>> {
            let ctx = ctx.clone();
            let run_id = run_id.clone();
            let parent = action_call_id.clone();
            Box::pin(async move {
                run_deck(
                    ctx.clone(),
                    RunInput {
                        path: req.path,
                        run_id,
                        action_call_id: new_call_id(),
                        parent_action_call_id: Some(parent),
                        depth: depth + 1,
                        input: req.input,
                        is_root: false,
                        state: None,
                        initial_user_message: None,
                        allow_root_string_input: false,
                    },
                )
                .await
            })
        })
    };

    let log: LogFn = {
        let ctx = ctx.clone();
        let run_id = run_id.to_string();
        let action_call_id = action_call_id.to_string();
        Arc::new(move |body: Value| {
            ctx.trace.emit(TraceEvent::Log {
                run_id: run_id.clone(),
                action_call_id: Some(action_call_id.clone()),
                level: LogLevel::Info,
                title: None,
                message: "compute deck log".to_string(),
                body,
                meta: None,
            });
        })
    };

    let exec_ctx = ExecutionContext::new(
        run_id.to_string(),
        action_call_id.to_string(),
        parent_action_call_id,
        depth,
        deck_input,
        deck.label.clone(),
        spawn,
        log,
    );

    let executor = deck.executor.clone().expect("is_compute_deck guarantees an executor");
    let output = executor(exec_ctx).await?;

    if let Some(schema) = &deck.output_schema {
        gambit_schema::validate(schema, &output)?;
    }

    Ok(output)
}

#[allow(clippy::too_many_arguments)]
async fn run_llm_deck(
    ctx: &Arc<RunContext>,
    run_id: &str,
    action_call_id: &str,
    parent_action_call_id: Option<String>,
    depth: u32,
    deck: &LoadedDeck,
    deck_input: Value,
    state: Option<SavedState>,
    initial_user_message: Option<String>,
    effective: EffectiveGuardrails,
) -> Result<Value> {
    let mut messages = match state {
        Some(s) if !s.is_empty() => s.messages,
        _ => {
            let mut msgs = vec![Message::system(deck.prompt.clone())];
            let (assistant, tool) = init_pair(&new_call_id(), &deck_input);
            msgs.push(assistant);
            msgs.push(tool);
            msgs
        }
    };
    if let Some(text) = &initial_user_message {
        messages.push(Message::user(text.clone()));
    }

    let mut tools: Vec<ToolDefinition> = Vec::new();
    for action in deck.actions.values() {
        let child = load_deck(&*ctx.deck_source, &action.path, false)?;
        tools.push(ToolDefinition {
            name: action.name.clone(),
            description: action.description.clone().unwrap_or_default(),
            parameters: gambit_schema::to_parameter_shape(child.input_schema.as_ref()),
        });
    }
    if deck.synthetic_tools.respond {
        tools.push(respond_tool_definition());
    }

    let idle = ActivityClock::new();
    let clock = crate::guardrails::TurnClock::start(effective.timeout_ms);

    let mut pass: u32 = 0;
    let final_value = loop {
        clock.check()?;
        check_passes(pass, effective.max_passes)?;

        let model_spec = resolve_model_spec(ctx, deck)?;
        let params = model_params_json(deck);

        let request = ChatRequest {
            model: String::new(),
            messages: messages.clone(),
            tools: tools.clone(),
            stream: ctx.stream,
            params,
        };

        ctx.trace.emit(TraceEvent::ModelCall {
            run_id: run_id.to_string(),
            action_call_id: action_call_id.to_string(),
            model: describe_model(&model_spec),
            message_count: messages.len(),
            tool_count: tools.len(),
        });

        let idle_for_stream = idle.clone();
        let ctx_for_stream = ctx.clone();
        let on_stream = move |text: &str| {
            idle_for_stream.touch();
            if let Some(cb) = &ctx_for_stream.on_stream_text {
                cb(text);
            }
        };

        let idle_notes: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let response = if let Some(handler) = &deck.handlers.on_idle {
            let delay = Duration::from_millis(handler.delay_ms.unwrap_or(ctx.project_guardrails.idle_timeout_ms));
            let repeat = handler.repeat_ms.map(Duration::from_millis);
            let ctx_fire = ctx.clone();
            let deck_path = deck.path.clone();
            let deck_label = deck.label.clone();
            let run_id_fire = run_id.to_string();
            let action_call_id_fire = action_call_id.to_string();
            let handler_path = handler.path.clone();
            let notes_fire = idle_notes.clone();
            race_with_timer(
                Box::pin(ctx.router.chat(&model_spec, request, Some(&on_stream))),
                delay,
                repeat,
                move |elapsed| {
                    let ctx_fire = ctx_fire.clone();
                    let deck_path = deck_path.clone();
                    let deck_label = deck_label.clone();
                    let run_id_fire = run_id_fire.clone();
                    let action_call_id_fire = action_call_id_fire.clone();
                    let handler_path = handler_path.clone();
                    let notes_fire = notes_fire.clone();
                    async move {
                        if let Some(note) = fire_idle_handler(
                            &ctx_fire,
                            &run_id_fire,
                            &action_call_id_fire,
                            depth,
                            &deck_path,
                            deck_label.as_deref(),
                            &handler_path,
                            elapsed,
                        )
                        .await
                        {
                            notes_fire.lock().unwrap_or_else(|e| e.into_inner()).push(note);
                        }
                    }
                },
            )
            .await?
        } else {
            ctx.router.chat(&model_spec, request, Some(&on_stream)).await?
        };

        for note in idle_notes.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            messages.push(Message::assistant_text(note));
        }

        ctx.trace.emit(TraceEvent::ModelResult {
            run_id: run_id.to_string(),
            action_call_id: action_call_id.to_string(),
            model: describe_model(&model_spec),
            finish_reason: format!("{:?}", response.finish_reason),
            tool_call_count: response.tool_calls.len(),
        });

        idle.touch();
        messages.push(response.message.clone());
        emit_state(ctx, run_id, &messages);

        match response.finish_reason {
            FinishReason::ToolCalls => {
                if response.tool_calls.is_empty() {
                    return Err(Error::Provider(
                        "provider reported finishReason tool_calls but returned no tool calls".to_string(),
                    ));
                }

                let mut responded_value: Option<Value> = None;

                for call in &response.tool_calls {
                    ctx.trace.emit(TraceEvent::ToolCall {
                        run_id: run_id.to_string(),
                        action_call_id: action_call_id.to_string(),
                        parent_action_call_id: parent_action_call_id.clone(),
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: serde_json::from_str(&call.arguments).unwrap_or(Value::Null),
                    });

                    if call.name == GAMBIT_RESPOND {
                        let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                        let respond_value = extract_respond_keys(args);
                        if let Some(payload) = respond_value.get("payload") {
                            if let Some(schema) = &deck.output_schema {
                                gambit_schema::validate(schema, payload)?;
                            }
                        }
                        messages.push(gambit_domain::tool::Message::tool_result(
                            call.id.clone(),
                            call.name.clone(),
                            call.arguments.clone(),
                        ));
                        ctx.trace.emit(TraceEvent::ToolResult {
                            run_id: run_id.to_string(),
                            action_call_id: action_call_id.to_string(),
                            parent_action_call_id: parent_action_call_id.clone(),
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            content: call.arguments.clone(),
                        });
                        responded_value = Some(respond_value);
                        break;
                    }

                    let outcome = dispatch_tool_call(ctx, deck, run_id, action_call_id, depth + 1, call, &idle).await?;

                    messages.push(gambit_domain::tool::Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        outcome.tool_content.clone(),
                    ));
                    ctx.trace.emit(TraceEvent::ToolResult {
                        run_id: run_id.to_string(),
                        action_call_id: action_call_id.to_string(),
                        parent_action_call_id: parent_action_call_id.clone(),
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        content: outcome.tool_content.clone(),
                    });

                    for note in &outcome.busy_notes {
                        messages.push(Message::assistant_text(note.clone()));
                    }
                    if let Some((assistant, tool)) = outcome.complete_pair {
                        messages.push(assistant);
                        messages.push(tool);
                    }
                }

                emit_state(ctx, run_id, &messages);

                if let Some(value) = responded_value {
                    break value;
                }
                pass += 1;
                continue;
            }
            FinishReason::Stop => {
                if deck.synthetic_tools.respond {
                    return Err(Error::Guardrail("Deck requires gambit_respond to finish".to_string()));
                }
                break response.message.text().map(|t| Value::String(t.to_string())).unwrap_or(Value::Null);
            }
            FinishReason::Length => match response.message.text() {
                Some(t) if !t.is_empty() => break Value::String(t.to_string()),
                _ => return Err(Error::Provider("provider stopped at length with no content".to_string())),
            },
        }
    };

    if let Some(schema) = &deck.output_schema {
        gambit_schema::validate(schema, &final_value)?;
    }

    Ok(final_value)
}

fn emit_state(ctx: &Arc<RunContext>, run_id: &str, messages: &[Message]) {
    if let Some(on_update) = &ctx.on_state_update {
        let snapshot = SavedState { run_id: run_id.to_string(), messages: sanitize(messages), meta: Default::default() };
        on_update(&snapshot);
    }
}

/// Only the keys `gambit_respond` actually received are carried forward
/// (§8 property 7: the envelope must equal-by-key what the call supplied,
/// not a fully-populated shape with nulls for the rest).
fn extract_respond_keys(args: Value) -> Value {
    let Value::Object(obj) = args else {
        return Value::Object(Default::default());
    };
    let mut out = serde_json::Map::new();
    for key in ["status", "payload", "message", "code", "meta"] {
        if let Some(v) = obj.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

fn resolve_model_spec(ctx: &Arc<RunContext>, deck: &LoadedDeck) -> Result<ProviderModelSelector> {
    if let Some(over) = &ctx.model_override {
        return Ok(ProviderModelSelector::Single(over.clone()));
    }
    if let Some(params) = &deck.model_params {
        if let Some(selector) = &params.model {
            return Ok(match selector {
                LoaderModelSelector::Single(s) => ProviderModelSelector::Single(s.clone()),
                LoaderModelSelector::Candidates(list) => ProviderModelSelector::Candidates(list.clone()),
            });
        }
    }
    if let Some(default) = &ctx.default_model {
        return Ok(ProviderModelSelector::Single(default.clone()));
    }
    Err(Error::Provider(format!("deck \"{}\" declares no model and no default is configured", deck.path)))
}

fn model_params_json(deck: &LoadedDeck) -> Value {
    let mut params = deck.model_params.as_ref().map(|p| p.extra.clone()).unwrap_or(Value::Object(Default::default()));
    if let Some(temp) = deck.model_params.as_ref().and_then(|p| p.temperature) {
        if let Value::Object(obj) = &mut params {
            obj.insert("temperature".to_string(), serde_json::json!(temp));
        }
    }
    params
}

#[allow(clippy::too_many_arguments)]
async fn fire_idle_handler(
    ctx: &Arc<RunContext>,
    run_id: &str,
    parent_action_call_id: &str,
    depth: u32,
    deck_path: &str,
    deck_label: Option<&str>,
    handler_path: &str,
    elapsed_ms: u64,
) -> Option<String> {
    let input = serde_json::json!({
        "kind": "idle",
        "label": deck_label,
        "source": { "deckPath": deck_path },
        "trigger": { "reason": "timeout", "elapsedMs": elapsed_ms },
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
        Ok(value) => crate::dispatch::extract_handler_message(&value),
        Err(e) => {
            tracing::warn!(error = %e, "idle handler failed");
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
            title: Some("idle".to_string()),
            message: note.clone(),
            body: Value::Null,
            meta: None,
        }),
    }
    Some(note)
}

fn describe_model(selector: &ProviderModelSelector) -> String {
    match selector {
        ProviderModelSelector::Single(s) => s.clone(),
        ProviderModelSelector::Candidates(list) => list.join(" | "),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use gambit_domain::config::{ProviderEntry, ProviderKind, ProvidersConfig};
    use gambit_domain::executor::{BoxFuture, ExecutionContext};
    use gambit_domain::stream::FinishReason as Finish;
    use gambit_domain::trace::MemorySink;
    use gambit_loader::{CodeDeckSource, DeckNode, GuardrailsOverride, Handlers, SyntheticTools};
    use gambit_providers::{ChatRequest as ProviderChatRequest, ChatResponse, LlmProvider, ProviderRegistry, ProviderRouter};

    use super::*;

    fn bare_llm_deck(path: &str, model: &str) -> DeckNode {
        DeckNode {
            path: path.to_string(),
            label: Some("root".to_string()),
            prompt: Some("you are a test agent".to_string()),
            model_params: Some(ModelParams {
                model: Some(LoaderModelSelector::Single(model.to_string())),
                temperature: None,
                extra: Value::Object(Default::default()),
            }),
            input_schema: None,
            output_schema: None,
            actions: vec![],
            embeds: vec![],
            handlers: Handlers::default(),
            synthetic_tools: SyntheticTools::default(),
            guardrails: GuardrailsOverride::default(),
            executor: None,
        }
    }

    /// Records the last request it was asked to serve and always answers
    /// with a fixed `stop` message — used to inspect the message list the
    /// engine actually builds (S2, S3).
    struct CapturingProvider {
        id: String,
        last_request: StdMutex<Option<ProviderChatRequest>>,
    }

    impl CapturingProvider {
        fn new(id: &str) -> Self {
            CapturingProvider { id: id.to_string(), last_request: StdMutex::new(None) }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for CapturingProvider {
        async fn chat(
            &self,
            req: &ProviderChatRequest,
            _on_stream_text: Option<&gambit_providers::traits::StreamTextCallback<'_>>,
        ) -> gambit_domain::error::Result<ChatResponse> {
            *self.last_request.lock().unwrap() = Some(req.clone());
            Ok(ChatResponse {
                message: Message::assistant_text("done"),
                finish_reason: Finish::Stop,
                tool_calls: Vec::new(),
                usage: None,
            })
        }

        fn provider_id(&self) -> &str {
            &self.id
        }
    }

    fn dummy_router(provider: Arc<CapturingProvider>) -> Arc<ProviderRouter> {
        let mut registry = ProviderRegistry::new();
        registry.register("dummy", provider as Arc<dyn LlmProvider>);
        let providers_config = ProvidersConfig {
            entries: [(
                "dummy".to_string(),
                ProviderEntry { kind: ProviderKind::Compatible, api_key_env: None, base_url: None, aliases: Default::default() },
            )]
            .into_iter()
            .collect(),
            default: Some("dummy".to_string()),
            fallback: None,
        };
        Arc::new(ProviderRouter::new(registry, providers_config))
    }

    #[tokio::test]
    async fn compute_deck_round_trips_input_to_output() {
        let mut source = CodeDeckSource::new();
        let executor: gambit_domain::executor::DeckExecutor = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, std::result::Result<Value, Error>> {
            Box::pin(async move {
                let input = ctx.input.as_str().unwrap_or_default().to_string();
                Ok(Value::String(format!("ok:{input}")))
            })
        });
        source.register_deck(
            "compute",
            DeckNode {
                path: "compute".to_string(),
                label: None,
                prompt: None,
                model_params: None,
                input_schema: Some(serde_json::json!({"type": "string"})),
                output_schema: Some(serde_json::json!({"type": "string"})),
                actions: vec![],
                embeds: vec![],
                handlers: Handlers::default(),
                synthetic_tools: SyntheticTools::default(),
                guardrails: GuardrailsOverride::default(),
                executor: Some(executor),
            },
        );

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider), Arc::new(MemorySink::new())));
        let result = run_deck(
            ctx,
            RunInput {
                path: "compute".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::String("hello".to_string()),
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(result, Value::String("ok:hello".to_string()));
    }

    fn object_schema_compute_deck(path: &str) -> DeckNode {
        let executor: gambit_domain::executor::DeckExecutor = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, std::result::Result<Value, Error>> {
            Box::pin(async move { Ok(ctx.input) })
        });
        DeckNode {
            path: path.to_string(),
            label: None,
            prompt: None,
            model_params: None,
            input_schema: Some(serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]})),
            output_schema: None,
            actions: vec![],
            embeds: vec![],
            handlers: Handlers::default(),
            synthetic_tools: SyntheticTools::default(),
            guardrails: GuardrailsOverride::default(),
            executor: Some(executor),
        }
    }

    #[tokio::test]
    async fn root_string_input_falls_back_when_allowed() {
        let mut source = CodeDeckSource::new();
        source.register_deck("compute", object_schema_compute_deck("compute"));

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider), Arc::new(MemorySink::new())));
        let result = run_deck(
            ctx,
            RunInput {
                path: "compute".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::String("plain text".to_string()),
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(result, Value::String("plain text".to_string()));
    }

    #[tokio::test]
    async fn root_string_input_rejected_when_fallback_disabled() {
        let mut source = CodeDeckSource::new();
        source.register_deck("compute", object_schema_compute_deck("compute"));

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider), Arc::new(MemorySink::new())));
        let err = run_deck(
            ctx,
            RunInput {
                path: "compute".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::String("plain text".to_string()),
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Schema(_)));
    }

    #[tokio::test]
    async fn llm_deck_without_initial_user_message_has_no_user_turn() {
        let mut source = CodeDeckSource::new();
        source.register_deck("root", bare_llm_deck("root", "dummy-model"));

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider.clone()), Arc::new(MemorySink::new())));
        run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap();

        let seen = provider.last_request.lock().unwrap().clone().unwrap();
        assert!(!seen.messages.iter().any(|m| matches!(m, Message::User { .. })));
    }

    #[tokio::test]
    async fn llm_deck_with_initial_user_message_appends_a_user_turn() {
        let mut source = CodeDeckSource::new();
        source.register_deck("root", bare_llm_deck("root", "dummy-model"));

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider.clone()), Arc::new(MemorySink::new())));
        run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: Some("first turn".to_string()),
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap();

        let seen = provider.last_request.lock().unwrap().clone().unwrap();
        let last_user = seen
            .messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User { content } => Some(content.clone()),
                _ => None,
            })
            .expect("expected a user message");
        assert_eq!(last_user, "first turn");
    }

    #[tokio::test]
    async fn llm_deck_emits_init_pair_with_encoded_input() {
        let mut source = CodeDeckSource::new();
        source.register_deck("root", bare_llm_deck("root", "dummy-model"));

        let provider = Arc::new(CapturingProvider::new("dummy"));
        let sink = Arc::new(MemorySink::new());
        let ctx = Arc::new(RunContext::new(Arc::new(source), dummy_router(provider), sink.clone()));
        run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: serde_json::json!({"question": "hours?"}),
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap();

        let events = sink.events();
        let init_call = events
            .iter()
            .find(|e| matches!(e, TraceEvent::ToolCall { tool_name, .. } if tool_name == crate::synthetic::GAMBIT_INIT));
        assert!(init_call.is_some());
        let init_result = events
            .iter()
            .find(|e| matches!(e, TraceEvent::ToolResult { tool_name, .. } if tool_name == crate::synthetic::GAMBIT_INIT))
            .expect("expected a gambit_init tool result event");
        if let TraceEvent::ToolResult { content, .. } = init_result {
            let decoded: Value = serde_json::from_str(content).unwrap();
            assert_eq!(decoded["question"], "hours?");
        }
    }

    #[tokio::test]
    async fn respond_envelope_carries_only_supplied_keys() {
        let mut source = CodeDeckSource::new();
        let mut deck = bare_llm_deck("root", "dummy-model");
        deck.synthetic_tools = SyntheticTools { respond: true };
        source.register_deck("root", deck);

        struct RespondingProvider;
        #[async_trait::async_trait]
        impl LlmProvider for RespondingProvider {
            async fn chat(
                &self,
                _req: &ProviderChatRequest,
                _on_stream_text: Option<&gambit_providers::traits::StreamTextCallback<'_>>,
            ) -> gambit_domain::error::Result<ChatResponse> {
                Ok(ChatResponse {
                    message: Message::assistant_tool_calls(
                        None,
                        vec![gambit_domain::tool::ToolCall {
                            id: "call_1".to_string(),
                            name: crate::synthetic::GAMBIT_RESPOND.to_string(),
                            arguments: serde_json::json!({"status": 503, "payload": "fail", "message": "nope", "code": "X"})
                                .to_string(),
                        }],
                    ),
                    finish_reason: Finish::ToolCalls,
                    tool_calls: vec![gambit_domain::tool::ToolCall {
                        id: "call_1".to_string(),
                        name: crate::synthetic::GAMBIT_RESPOND.to_string(),
                        arguments: serde_json::json!({"status": 503, "payload": "fail", "message": "nope", "code": "X"})
                            .to_string(),
                    }],
                    usage: None,
                })
            }

            fn provider_id(&self) -> &str {
                "dummy"
            }
        }

        let mut registry = ProviderRegistry::new();
        registry.register("dummy", Arc::new(RespondingProvider) as Arc<dyn LlmProvider>);
        let providers_config = ProvidersConfig {
            entries: [(
                "dummy".to_string(),
                ProviderEntry { kind: ProviderKind::Compatible, api_key_env: None, base_url: None, aliases: Default::default() },
            )]
            .into_iter()
            .collect(),
            default: Some("dummy".to_string()),
            fallback: None,
        };
        let router = Arc::new(ProviderRouter::new(registry, providers_config));

        let ctx = Arc::new(RunContext::new(Arc::new(source), router, Arc::new(MemorySink::new())));
        let result = run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            serde_json::json!({"status": 503, "payload": "fail", "message": "nope", "code": "X"})
        );
    }

    struct FixedResponseProvider {
        response: StdMutex<Option<ChatResponse>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FixedResponseProvider {
        async fn chat(
            &self,
            _req: &ProviderChatRequest,
            _on_stream_text: Option<&gambit_providers::traits::StreamTextCallback<'_>>,
        ) -> gambit_domain::error::Result<ChatResponse> {
            Ok(self.response.lock().unwrap().take().expect("chat called more than once"))
        }

        fn provider_id(&self) -> &str {
            "dummy"
        }
    }

    fn fixed_router(response: ChatResponse) -> Arc<ProviderRouter> {
        let mut registry = ProviderRegistry::new();
        registry.register(
            "dummy",
            Arc::new(FixedResponseProvider { response: StdMutex::new(Some(response)) }) as Arc<dyn LlmProvider>,
        );
        let providers_config = ProvidersConfig {
            entries: [(
                "dummy".to_string(),
                ProviderEntry { kind: ProviderKind::Compatible, api_key_env: None, base_url: None, aliases: Default::default() },
            )]
            .into_iter()
            .collect(),
            default: Some("dummy".to_string()),
            fallback: None,
        };
        Arc::new(ProviderRouter::new(registry, providers_config))
    }

    #[tokio::test]
    async fn tool_calls_finish_reason_with_no_calls_is_rejected() {
        let mut source = CodeDeckSource::new();
        source.register_deck("root", bare_llm_deck("root", "dummy-model"));

        let response = ChatResponse {
            message: Message::assistant_text("huh"),
            finish_reason: Finish::ToolCalls,
            tool_calls: Vec::new(),
            usage: None,
        };
        let ctx = Arc::new(RunContext::new(Arc::new(source), fixed_router(response), Arc::new(MemorySink::new())));
        let err = run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("tool_calls"));
    }

    #[tokio::test]
    async fn stop_without_respond_call_is_rejected_when_respond_is_required() {
        let mut source = CodeDeckSource::new();
        let mut deck = bare_llm_deck("root", "dummy-model");
        deck.synthetic_tools = SyntheticTools { respond: true };
        source.register_deck("root", deck);

        let response = ChatResponse {
            message: Message::assistant_text("done, but never called gambit_respond"),
            finish_reason: Finish::Stop,
            tool_calls: Vec::new(),
            usage: None,
        };
        let ctx = Arc::new(RunContext::new(Arc::new(source), fixed_router(response), Arc::new(MemorySink::new())));
        let err = run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("gambit_respond"));
    }

    #[tokio::test]
    async fn length_finish_reason_with_no_content_is_rejected() {
        let mut source = CodeDeckSource::new();
        source.register_deck("root", bare_llm_deck("root", "dummy-model"));

        let response = ChatResponse {
            message: Message::assistant_text(""),
            finish_reason: Finish::Length,
            tool_calls: Vec::new(),
            usage: None,
        };
        let ctx = Arc::new(RunContext::new(Arc::new(source), fixed_router(response), Arc::new(MemorySink::new())));
        let err = run_deck(
            ctx,
            RunInput {
                path: "root".to_string(),
                run_id: "r1".to_string(),
                action_call_id: "a1".to_string(),
                parent_action_call_id: None,
                depth: 0,
                input: Value::Null,
                is_root: true,
                state: None,
                initial_user_message: None,
                allow_root_string_input: false,
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("length"));
    }
}
