//! Structured-output schema construction and validation.
//!
//! Mode data schemas are plain JSON Schema documents; the validator below
//! interprets the same document the request constraint is built from, so the
//! two never drift apart.

use serde_json::{json, Value};

/// Outer contract for a single enrichment run.
pub fn envelope_schema(data_schema: &Value) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "clean_transcript": { "type": "string" },
            "summary": { "type": "string" },
            "actions": { "type": "array", "items": { "type": "string" } },
            "tags": { "type": "array", "items": { "type": "string" } },
            "data": data_schema
        },
        "required": ["clean_transcript", "summary", "actions", "tags", "data"]
    })
}

/// Contract for a follow-up run: the updated envelope plus the model's view
/// of what changed (which is later replaced by the local diff).
pub fn update_schema(data_schema: &Value) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "result": envelope_schema(data_schema),
            "change_log": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "path": { "type": "string" },
                        "before": { "type": ["string", "null"] },
                        "after": { "type": ["string", "null"] }
                    },
                    "required": ["path", "before", "after"]
                }
            }
        },
        "required": ["result", "change_log"]
    })
}

/// Structural validation of `value` against `schema`.
///
/// Covers the subset the mode schemas use: `type` (string or array of
/// strings), `properties` / `required` / `additionalProperties: false`,
/// array `items`, and string `enum`. Acceptance guarantees every required
/// key is present and no undeclared key survives.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(type_spec) = schema.get("type") {
        if !matches_type(type_spec, value) {
            return Err(format!(
                "{}: expected {}, got {}",
                path,
                describe_type(type_spec),
                value_kind(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{}: value not in enum", path));
        }
    }

    if let Some(object) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{}: missing required key '{}'", path, key));
                }
            }
        }

        let closed = schema
            .get("additionalProperties")
            .map(|v| v == &Value::Bool(false))
            .unwrap_or(false);

        for (key, child) in object {
            match properties.and_then(|p| p.get(key)) {
                Some(child_schema) => {
                    validate_at(child_schema, child, &format!("{}.{}", path, key))?;
                }
                None if closed => {
                    return Err(format!("{}: unexpected key '{}'", path, key));
                }
                None => {}
            }
        }
    }

    if let Some(items) = value.as_array() {
        if let Some(item_schema) = schema.get("items") {
            for (index, item) in items.iter().enumerate() {
                validate_at(item_schema, item, &format!("{}[{}]", path, index))?;
            }
        }
    }

    Ok(())
}

fn matches_type(type_spec: &Value, value: &Value) -> bool {
    match type_spec {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn describe_type(type_spec: &Value) -> String {
    match type_spec {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "title": { "type": "string" },
                "bullets": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "bullets"]
        })
    }

    #[test]
    fn accepts_conforming_envelope() {
        let schema = envelope_schema(&note_schema());
        let value = json!({
            "clean_transcript": "Buy milk tomorrow",
            "summary": "Groceries",
            "actions": ["buy milk"],
            "tags": ["errand"],
            "data": { "title": "Groceries", "bullets": ["milk"] }
        });
        assert!(validate(&schema, &value).is_ok());
    }

    #[test]
    fn rejects_extra_envelope_key() {
        let schema = envelope_schema(&note_schema());
        let value = json!({
            "clean_transcript": "x",
            "summary": "x",
            "actions": [],
            "tags": [],
            "data": { "title": "x", "bullets": [] },
            "confidence": 0.9
        });
        let err = validate(&schema, &value).unwrap_err();
        assert!(err.contains("unexpected key 'confidence'"), "{}", err);
    }

    #[test]
    fn rejects_missing_required_key() {
        let schema = envelope_schema(&note_schema());
        let value = json!({
            "clean_transcript": "x",
            "summary": "x",
            "actions": [],
            "tags": [],
            "data": { "title": "x" }
        });
        let err = validate(&schema, &value).unwrap_err();
        assert!(err.contains("missing required key 'bullets'"), "{}", err);
    }

    #[test]
    fn rejects_wrong_item_type() {
        let schema = envelope_schema(&note_schema());
        let value = json!({
            "clean_transcript": "x",
            "summary": "x",
            "actions": [1, 2],
            "tags": [],
            "data": { "title": "x", "bullets": [] }
        });
        let err = validate(&schema, &value).unwrap_err();
        assert!(err.contains("$.actions[0]"), "{}", err);
    }

    #[test]
    fn nullable_union_accepts_both_sides() {
        let schema = json!({ "type": ["string", "null"] });
        assert!(validate(&schema, &json!("9am")).is_ok());
        assert!(validate(&schema, &json!(null)).is_ok());
        assert!(validate(&schema, &json!(42)).is_err());
    }

    #[test]
    fn enum_constrains_values() {
        let schema = json!({ "type": "string", "enum": ["low", "medium", "high"] });
        assert!(validate(&schema, &json!("medium")).is_ok());
        assert!(validate(&schema, &json!("urgent")).is_err());
    }

    #[test]
    fn update_schema_requires_change_log() {
        let schema = update_schema(&note_schema());
        let value = json!({
            "result": {
                "clean_transcript": "x",
                "summary": "x",
                "actions": [],
                "tags": [],
                "data": { "title": "x", "bullets": [] }
            }
        });
        assert!(validate(&schema, &value).is_err());

        let value = json!({
            "result": {
                "clean_transcript": "x",
                "summary": "x",
                "actions": [],
                "tags": [],
                "data": { "title": "x", "bullets": [] }
            },
            "change_log": [
                { "path": "summary", "before": null, "after": "x" }
            ]
        });
        assert!(validate(&schema, &value).is_ok());
    }
}
