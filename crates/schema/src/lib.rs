//! The schema engine (C1): structured validation and JSON-schema
//! projection for action parameters.
//!
//! Grounded on the `jsonschema` crate usage in the example pack (e.g.
//! `stencila-stencila`'s tool-argument validator), which compiles a
//! schema once via `jsonschema::validator_for` and walks `iter_errors`
//! to build a message list, the same shape reused here.

use gambit_domain::error::SchemaError;
use serde_json::Value;

/// Validate `value` against `schema`, returning the (unmodified, JSON
/// Schema performs no coercion) value on success.
///
/// On failure, returns the *first* validation error with its JSON
/// Pointer-style instance path, per §4.1's "field path and a short
/// message" contract. A schema that fails to compile is itself a
/// `SchemaError` at the root path.
pub fn validate(schema: &Value, value: &Value) -> Result<Value, SchemaError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError {
        path: "".to_string(),
        message: format!("invalid schema: {}", e),
    })?;

    if let Some(first) = validator.iter_errors(value).next() {
        return Err(SchemaError {
            path: first.instance_path.to_string(),
            message: first.to_string(),
        });
    }

    Ok(value.clone())
}

/// Does `value` pass `schema`? Cheaper than [`validate`] when the caller
/// doesn't need the failure detail.
pub fn is_valid(schema: &Value, value: &Value) -> bool {
    jsonschema::validator_for(schema)
        .map(|v| v.is_valid(value))
        .unwrap_or(false)
}

/// Project a deck/card input schema into the `parameters` field of a tool
/// definition handed to the model. JSON Schema is already the wire shape
/// tool parameters expect; this mostly guards against an author leaving
/// the schema unset (falls back to an object schema accepting anything)
/// or supplying a non-object root (wrapped so every provider sees an
/// object-shaped `parameters` field, which all current model APIs require).
pub fn to_parameter_shape(schema: Option<&Value>) -> Value {
    match schema {
        None => serde_json::json!({ "type": "object", "properties": {} }),
        Some(Value::Object(obj)) => {
            if obj.get("type").and_then(Value::as_str) == Some("object") || obj.contains_key("properties") {
                Value::Object(obj.clone())
            } else {
                serde_json::json!({
                    "type": "object",
                    "properties": { "value": obj.clone() },
                    "required": ["value"],
                })
            }
        }
        Some(other) => serde_json::json!({
            "type": "object",
            "properties": { "value": other.clone() },
            "required": ["value"],
        }),
    }
}

/// Structural gate: `value` must be a JSON object or boolean (the two
/// forms a JSON Schema document may legally take). Does not compile the
/// schema — callers that need to know it actually compiles should call
/// [`validate`]/[`is_valid`] and handle the compile error there.
pub fn assert_is_schema(value: &Value, label: &str) -> Result<(), SchemaError> {
    match value {
        Value::Object(_) | Value::Bool(_) => Ok(()),
        other => Err(SchemaError {
            path: "".to_string(),
            message: format!("{} must be a JSON Schema object, got {}", label, type_name(other)),
        }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a root deck's raw user-supplied string input against its
/// declared input schema, honoring `allowRootStringInput` (§4.1): when the
/// schema is non-string-shaped and the flag is set, fall back to the
/// original string on failure instead of rejecting the run.
pub fn validate_root_string_input(
    schema: Option<&Value>,
    raw: &str,
    allow_root_string_input: bool,
) -> Result<Value, SchemaError> {
    let Some(schema) = schema else {
        return Ok(Value::String(raw.to_string()));
    };

    let as_value: Value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    match validate(schema, &as_value) {
        Ok(v) => Ok(v),
        Err(e) if allow_root_string_input => {
            tracing::debug!(error = %e, "root string input failed schema validation; falling back to raw string");
            Ok(Value::String(raw.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_matching_value() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } }, "required": ["q"] });
        let value = json!({ "q": "hours?" });
        assert_eq!(validate(&schema, &value).unwrap(), value);
    }

    #[test]
    fn validate_reports_path_and_message_on_failure() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } }, "required": ["q"] });
        let value = json!({ "q": 5 });
        let err = validate(&schema, &value).unwrap_err();
        assert_eq!(err.path, "/q");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn assert_is_schema_rejects_non_object_non_bool() {
        let err = assert_is_schema(&json!("not a schema"), "inputSchema").unwrap_err();
        assert!(err.message.contains("inputSchema"));
    }

    #[test]
    fn assert_is_schema_accepts_boolean_schemas() {
        assert!(assert_is_schema(&json!(true), "inputSchema").is_ok());
    }

    #[test]
    fn to_parameter_shape_defaults_to_empty_object_when_absent() {
        let shape = to_parameter_shape(None);
        assert_eq!(shape["type"], "object");
    }

    #[test]
    fn to_parameter_shape_passes_through_object_schemas() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } } });
        assert_eq!(to_parameter_shape(Some(&schema)), schema);
    }

    #[test]
    fn root_string_input_falls_back_when_allowed() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } }, "required": ["q"] });
        let result = validate_root_string_input(Some(&schema), "plain text", true).unwrap();
        assert_eq!(result, json!("plain text"));
    }

    #[test]
    fn root_string_input_rejects_when_fallback_disabled() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } }, "required": ["q"] });
        assert!(validate_root_string_input(Some(&schema), "plain text", false).is_err());
    }
}
