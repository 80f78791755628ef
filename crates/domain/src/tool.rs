use serde::{Deserialize, Serialize};

/// A model-issued tool call. `arguments` is the JSON-encoded string the
/// model produced, not a parsed `Value` — callers parse it themselves once
/// they know which action's parameter schema to parse it against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Tool definition exposed to the model. `parameters` is a JSON Schema
/// object, usually the merged schema of a deck's declared actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A message in the conversation sent to or returned from a model.
///
/// Unlike the teacher's single `Message{role, content}` struct with a
/// free-form `content`, each role carries exactly the fields that role can
/// have: only the assistant role carries `tool_calls`, only the tool role
/// carries `tool_call_id`/`name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System { content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User { content: text.into() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant { content, tool_calls }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// The plain-text content of this message, if any. Assistant messages
    /// with only tool calls and no text return `None`.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content.as_str()),
            Message::Assistant { content, .. } => content.as_deref(),
            Message::Tool { content, .. } => Some(content.as_str()),
        }
    }
}
