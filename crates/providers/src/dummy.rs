//! Test-only provider adapters. Not part of the public interface contract
//! — used by this crate's router tests and by the run engine's own tests
//! to exercise model-call dispatch without a real HTTP adapter (the S2
//! scenario's `modelParams.model = "dummy-model"` deck).

use gambit_domain::error::{Error, Result};
use gambit_domain::stream::FinishReason;
use gambit_domain::tool::Message;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, StreamTextCallback};

/// Always answers with a fixed assistant message and no tool calls.
pub struct DummyProvider {
    id: String,
}

impl DummyProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait::async_trait]
impl LlmProvider for DummyProvider {
    async fn chat(&self, _req: &ChatRequest, on_stream_text: Option<&StreamTextCallback<'_>>) -> Result<ChatResponse> {
        if let Some(cb) = on_stream_text {
            cb("dummy response");
        }
        Ok(ChatResponse {
            message: Message::assistant_text("dummy response"),
            finish_reason: FinishReason::Stop,
            tool_calls: Vec::new(),
            usage: None,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

/// Always fails. Used to exercise router fallback.
pub struct FailingProvider {
    id: String,
}

impl FailingProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait::async_trait]
impl LlmProvider for FailingProvider {
    async fn chat(&self, _req: &ChatRequest, _on_stream_text: Option<&StreamTextCallback<'_>>) -> Result<ChatResponse> {
        Err(Error::Provider(format!("{} is deliberately unreachable", self.id)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
