//! Engine-internal synthetic tool names and the message pairs that
//! represent them in history. Deck authors can never define these names
//! (the loader's reserved-prefix rule guarantees it — §3).

use gambit_domain::tool::{Message, ToolCall, ToolDefinition};
use serde_json::Value;

pub const GAMBIT_INIT: &str = "gambit_init";
pub const GAMBIT_RESPOND: &str = "gambit_respond";
pub const GAMBIT_COMPLETE: &str = "gambit_complete";

/// A short opaque call id (§9: "≲40 chars to remain compatible with
/// popular model APIs").
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Build the `gambit_init` assistant tool-call + tool-result pair (§4.6
/// step 2): seeds the deck's declared input into history as if the model
/// had asked for it.
pub fn init_pair(call_id: &str, input: &Value) -> (Message, Message) {
    let assistant = Message::assistant_tool_calls(
        None,
        vec![ToolCall { id: call_id.to_string(), name: GAMBIT_INIT.to_string(), arguments: "{}".to_string() }],
    );
    let content = serde_json::to_string(input).unwrap_or_else(|_| "null".to_string());
    let tool = Message::tool_result(call_id, GAMBIT_INIT, content);
    (assistant, tool)
}

/// Build the trailing `gambit_complete` assistant+tool pair (§4.6.1 step
/// 4): records a completed child call explicitly in history, separate
/// from the assistant tool-call/result pair for the original call.
pub fn complete_pair(call_id: &str, envelope_content: &str) -> (Message, Message) {
    let assistant = Message::assistant_tool_calls(
        None,
        vec![ToolCall { id: call_id.to_string(), name: GAMBIT_COMPLETE.to_string(), arguments: "{}".to_string() }],
    );
    let tool = Message::tool_result(call_id, GAMBIT_COMPLETE, envelope_content);
    (assistant, tool)
}

/// The `gambit_respond(status?, payload?, message?, code?, meta?)` tool
/// definition, added when a deck sets `syntheticTools.respond` (§4.6 step
/// 3).
pub fn respond_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: GAMBIT_RESPOND.to_string(),
        description: "Complete this deck with a structured response envelope.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "status": { "type": "integer" },
                "payload": {},
                "message": { "type": "string" },
                "code": { "type": "string" },
                "meta": { "type": "object" },
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_pair_encodes_input_as_tool_content() {
        let (assistant, tool) = init_pair("call_1", &serde_json::json!({"question": "hours?"}));
        match assistant {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls[0].name, GAMBIT_INIT);
            }
            _ => panic!("expected assistant"),
        }
        match tool {
            Message::Tool { content, name, .. } => {
                assert_eq!(name, GAMBIT_INIT);
                let decoded: Value = serde_json::from_str(&content).unwrap();
                assert_eq!(decoded["question"], "hours?");
            }
            _ => panic!("expected tool"),
        }
    }
}
