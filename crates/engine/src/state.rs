//! `SavedState` (§3): the authoritative conversation record a run carries
//! across passes and across continuations. The artifact store (C6) owns
//! persisting it; the engine only ever mutates it in memory and hands an
//! immutable snapshot to `onStateUpdate`.

use std::collections::HashMap;

use gambit_domain::tool::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedState {
    pub run_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl SavedState {
    pub fn new(run_id: impl Into<String>) -> Self {
        SavedState { run_id: run_id.into(), messages: Vec::new(), meta: HashMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Strip empty `tool_calls` arrays from assistant messages before handing
/// a state snapshot to `onStateUpdate` (§4.6.4). An assistant message with
/// no content but at least one tool_call is left untouched — that shape is
/// valid (§9 open question).
pub fn sanitize(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match m {
            Message::Assistant { content, tool_calls } if tool_calls.is_empty() => {
                Message::Assistant { content: content.clone(), tool_calls: Vec::new() }
            }
            other => other.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_domain::tool::ToolCall;

    #[test]
    fn sanitize_leaves_empty_content_with_tool_calls_intact() {
        let messages = vec![Message::assistant_tool_calls(
            None,
            vec![ToolCall { id: "c1".into(), name: "x".into(), arguments: "{}".into() }],
        )];
        let sanitized = sanitize(&messages);
        match &sanitized[0] {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls.len(), 1);
            }
            _ => panic!("expected assistant"),
        }
    }
}
