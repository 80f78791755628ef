use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::tool::ToolCall;

/// A boxed async stream, used for model streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Why a model turn stopped. Closed (unlike the teacher's free
/// `Option<String>`) because the engine branches on it directly: only
/// `ToolCalls` triggers action dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Events emitted during a provider's token-delta streaming call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "token")]
    Token { text: String },

    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    #[serde(rename = "tool_call_finished")]
    ToolCallFinished { call_id: String, tool_name: String, arguments: String },

    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: FinishReason,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Events emitted by providers that expose a "responses"-style event
/// stream (named lifecycle events rather than raw token deltas). A
/// provider adapter may implement either `chat_stream` (`StreamEvent`) or
/// `responses_stream` (`ResponseEvent`), or both; the run engine only
/// requires `chat_stream`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "response.created")]
    Created { response_id: String },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone { text: String },

    #[serde(rename = "response.completed")]
    Completed {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
        usage: Option<Usage>,
        finish_reason: FinishReason,
    },
}
