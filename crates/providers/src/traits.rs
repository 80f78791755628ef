use gambit_domain::error::Result;
use gambit_domain::stream::{BoxStream, FinishReason, ResponseEvent, StreamEvent, Usage};
use gambit_domain::tool::{Message, ToolCall, ToolDefinition};

/// A provider-agnostic chat request (§4.4). `on_stream_text`/`on_stream_event`
/// are passed as separate callback arguments rather than request fields,
/// since a `ChatRequest` needs to stay `Clone`-able for retry/fallback
/// while a stream callback is a one-shot borrow.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
    /// Free-form provider params (temperature, reasoning effort, ...).
    pub params: serde_json::Value,
}

/// A provider-agnostic chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: FinishReason,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

pub type StreamTextCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;
pub type StreamEventCallback<'a> = dyn Fn(&ResponseEvent) + Send + Sync + 'a;

/// Trait every model adapter implements. Concrete adapters (OpenAI,
/// Anthropic, a local runner's HTTP surface) live outside the core —
/// the core only depends on this interface (§1, §4.4).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// The primary entry point: one request/response chat turn. When
    /// `req.stream` is set, the provider MAY invoke `on_stream_text` zero
    /// or more times before resolving.
    async fn chat(&self, req: &ChatRequest, on_stream_text: Option<&StreamTextCallback<'_>>) -> Result<ChatResponse>;

    /// Whether this provider also exposes the `responses` event-stream
    /// variant (§4.4). Default `false` — `chat` is the only interface
    /// the run engine requires.
    fn supports_responses(&self) -> bool {
        false
    }

    /// The event-stream variant. Only called when `supports_responses`
    /// returns `true`.
    async fn responses(
        &self,
        req: &ChatRequest,
        on_stream_event: Option<&StreamEventCallback<'_>>,
    ) -> Result<ChatResponse> {
        let _ = (req, on_stream_event);
        Err(gambit_domain::error::Error::Provider(format!(
            "{} does not implement the responses() event-stream variant",
            self.provider_id()
        )))
    }

    /// A raw provider-native streaming call, used by adapters that want
    /// to expose token deltas as a pull stream rather than a push
    /// callback. Default: unsupported.
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let _ = req;
        Err(gambit_domain::error::Error::Provider(format!(
            "{} does not implement chat_stream",
            self.provider_id()
        )))
    }

    /// Whether this provider instance is currently usable (e.g. has a
    /// resolvable API key, or — for local runners — the target model is
    /// pulled/installed). Default `true`; adapters that need real
    /// availability probing override this.
    fn is_available(&self) -> bool {
        true
    }

    /// A unique identifier for this provider instance, and the routing
    /// prefix it binds (§4.5).
    fn provider_id(&self) -> &str;
}
