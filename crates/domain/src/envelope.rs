use serde::{Deserialize, Serialize};

/// The canonical record tools and handlers exchange when a child deck
/// call completes, fails, or is otherwise normalized into history. Every
/// tool-dispatch result, busy-handler note, and error-handler result is
/// wrapped in one of these before it becomes a tool message's `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub run_id: String,
    pub action_call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_action_call_id: Option<String>,
    pub source: EnvelopeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSource {
    pub deck_path: String,
    pub action_name: String,
}

impl Envelope {
    /// Build the `{status:404, message:"unknown action"}` envelope the
    /// engine returns (without dispatching) when a tool call names an
    /// action the parent deck doesn't declare.
    pub fn unknown_action(
        run_id: impl Into<String>,
        action_call_id: impl Into<String>,
        parent_action_call_id: Option<String>,
        deck_path: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Envelope {
            run_id: run_id.into(),
            action_call_id: action_call_id.into(),
            parent_action_call_id,
            source: EnvelopeSource {
                deck_path: deck_path.into(),
                action_name: action_name.into(),
            },
            status: Some(404),
            payload: None,
            message: Some("unknown action".to_string()),
            code: None,
            meta: None,
        }
    }

    /// Normalize a child deck's successful return value (§4.6.2): if the
    /// value is already an object carrying any of
    /// `status/payload/message/code/meta`, keep those fields verbatim;
    /// otherwise the whole value becomes `payload`.
    pub fn from_child_result(
        run_id: impl Into<String>,
        action_call_id: impl Into<String>,
        parent_action_call_id: Option<String>,
        deck_path: impl Into<String>,
        action_name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        let source = EnvelopeSource {
            deck_path: deck_path.into(),
            action_name: action_name.into(),
        };
        let (status, payload, message, code, meta) = split_envelope_fields(result);
        Envelope {
            run_id: run_id.into(),
            action_call_id: action_call_id.into(),
            parent_action_call_id,
            source,
            status,
            payload,
            message,
            code,
            meta,
        }
    }

    /// Build the `HANDLER_FALLBACK` envelope (§4.6.3) synthesized when an
    /// `onError` handler itself throws.
    pub fn handler_fallback(
        run_id: impl Into<String>,
        action_call_id: impl Into<String>,
        parent_action_call_id: Option<String>,
        deck_path: impl Into<String>,
        action_name: impl Into<String>,
        original_error: impl std::fmt::Display,
        envelope_input: serde_json::Value,
    ) -> Self {
        Envelope {
            run_id: run_id.into(),
            action_call_id: action_call_id.into(),
            parent_action_call_id,
            source: EnvelopeSource {
                deck_path: deck_path.into(),
                action_name: action_name.into(),
            },
            status: Some(500),
            payload: Some(envelope_input),
            message: Some(format!("Handled error: {}", original_error)),
            code: Some("HANDLER_FALLBACK".to_string()),
            meta: Some(serde_json::json!({ "handlerFailed": true })),
        }
    }

    pub fn to_tool_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":500,"code":"ENVELOPE_SERIALIZATION_FAILED","message":"envelope serialization failed"}"#
                .to_string()
        })
    }
}

/// A value is treated as a pre-shaped envelope body if it's a JSON object
/// containing at least one of the recognized keys; otherwise the whole
/// value becomes `payload`.
fn split_envelope_fields(
    value: serde_json::Value,
) -> (
    Option<u32>,
    Option<serde_json::Value>,
    Option<String>,
    Option<String>,
    Option<serde_json::Value>,
) {
    const KEYS: [&str; 5] = ["status", "payload", "message", "code", "meta"];
    if let serde_json::Value::Object(mut obj) = value {
        if KEYS.iter().any(|k| obj.contains_key(*k)) {
            let status = obj.remove("status").and_then(|v| v.as_u64()).map(|v| v as u32);
            let payload = obj.remove("payload");
            let message = obj.remove("message").and_then(|v| v.as_str().map(str::to_string));
            let code = obj.remove("code").and_then(|v| v.as_str().map(str::to_string));
            let meta = obj.remove("meta");
            return (status, payload, message, code, meta);
        }
        return (None, Some(serde_json::Value::Object(obj)), None, None, None);
    }
    (None, Some(value), None, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_envelope_has_404() {
        let env = Envelope::unknown_action("r1", "a1", None, "/decks/root.md", "missing_action");
        assert_eq!(env.status, Some(404));
        assert_eq!(env.message.as_deref(), Some("unknown action"));
    }

    #[test]
    fn from_child_result_keeps_shaped_fields_verbatim() {
        let env = Envelope::from_child_result(
            "r1",
            "a1",
            Some("parent1".into()),
            "/decks/child.md",
            "child",
            json!({ "status": 503, "payload": "fail", "message": "nope", "code": "X" }),
        );
        assert_eq!(env.status, Some(503));
        assert_eq!(env.payload, Some(json!("fail")));
        assert_eq!(env.message.as_deref(), Some("nope"));
        assert_eq!(env.code.as_deref(), Some("X"));
    }

    #[test]
    fn from_child_result_wraps_bare_value_as_payload() {
        let env = Envelope::from_child_result(
            "r1",
            "a1",
            None,
            "/decks/child.md",
            "child",
            json!("ok:hello"),
        );
        assert_eq!(env.payload, Some(json!("ok:hello")));
        assert!(env.status.is_none());
    }

    #[test]
    fn handler_fallback_envelope_matches_spec_shape() {
        let env = Envelope::handler_fallback(
            "r1",
            "a1",
            None,
            "/decks/child.md",
            "child",
            "boom",
            json!({"kind": "error"}),
        );
        assert_eq!(env.status, Some(500));
        assert_eq!(env.code.as_deref(), Some("HANDLER_FALLBACK"));
        assert_eq!(env.message.as_deref(), Some("Handled error: boom"));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope::unknown_action("r1", "a1", Some("p1".into()), "/d.md", "x");
        let content = env.to_tool_content();
        let parsed: Envelope = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.run_id, "r1");
        assert_eq!(parsed.parent_action_call_id.as_deref(), Some("p1"));
    }
}
