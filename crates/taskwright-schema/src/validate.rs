//! A pragmatic subset of JSON Schema draft-07: `type`, `required`,
//! `properties`, `enum`, `items`, `minLength`/`maxLength`,
//! `minimum`/`maximum`. This is not a full draft-07 implementation — no
//! `$ref`, `allOf`/`anyOf`/`oneOf`, `patternProperties`, or format
//! validation — but it covers the shapes worker/QA response schemas
//! actually use.

use serde_json::Value;

/// One schema-validation failure, with a JSON-pointer-ish path to the
/// offending value so operators can see exactly where a response went
/// wrong without re-reading the whole blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of validating a JSON value against a schema.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<SchemaError>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<SchemaError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Parse `bytes` as JSON and validate it against `schema`.
///
/// Distinguishes a parse failure (the `errors` vec is empty and `valid` is
/// false, with the parse error reported separately) from a validation
/// failure (valid JSON, wrong shape).
pub fn validate_json(bytes: &[u8], schema: &Value) -> Result<ValidationOutcome, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    let mut errors = Vec::new();
    check(&value, schema, "$", &mut errors);
    Ok(ValidationOutcome::from_errors(errors))
}

fn check(value: &Value, schema: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !matches_type(value, expected) {
            errors.push(SchemaError::new(
                path,
                format!("expected type {expected}, got {}", value_type_name(value)),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(SchemaError::new(
                path,
                format!("value {value} is not one of the allowed enum values"),
            ));
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) < min {
                errors.push(SchemaError::new(path, format!("string shorter than minLength {min}")));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) > max {
                errors.push(SchemaError::new(path, format!("string longer than maxLength {max}")));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(SchemaError::new(path, format!("value {n} below minimum {min}")));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(SchemaError::new(path, format!("value {n} above maximum {max}")));
            }
        }
    }

    if let Value::Object(obj) = value {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    errors.push(SchemaError::new(path, format!("missing required field {key:?}")));
                }
            }
        }

        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, sub_schema) in props {
                if let Some(sub_value) = obj.get(key) {
                    let sub_path = format!("{path}.{key}");
                    check(sub_value, sub_schema, &sub_path, errors);
                }
            }
        }
    }

    if let Value::Array(items) = value {
        if let Some(item_schema) = schema.get("items") {
            for (index, item) in items.iter().enumerate() {
                let sub_path = format!("{path}[{index}]");
                check(item, item_schema, &sub_path, errors);
            }
        }
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn value_type_name(value: &Value) -> &'static str {
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

    #[test]
    fn accepts_conforming_document() {
        let schema = json!({
            "type": "object",
            "required": ["verdict"],
            "properties": {
                "verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]},
            },
        });
        let outcome = validate_json(br#"{"verdict": "pass"}"#, &schema).unwrap();
        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn reports_missing_required_field() {
        let schema = json!({"type": "object", "required": ["verdict"]});
        let outcome = validate_json(b"{}", &schema).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("verdict"));
    }

    #[test]
    fn reports_enum_mismatch_with_nested_path() {
        let schema = json!({
            "type": "object",
            "properties": {
                "verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]},
            },
        });
        let outcome = validate_json(br#"{"verdict": "maybe"}"#, &schema).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].path, "$.verdict");
    }

    #[test]
    fn distinguishes_parse_failure_from_validation_failure() {
        let schema = json!({"type": "object"});
        let result = validate_json(b"not json at all", &schema);
        assert!(result.is_err());
    }

    #[test]
    fn validates_array_items() {
        let schema = json!({
            "type": "array",
            "items": {"type": "string", "minLength": 1},
        });
        let outcome = validate_json(br#"["a", ""]"#, &schema).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].path, "$[1]");
    }

    #[test]
    fn enforces_numeric_bounds() {
        let schema = json!({"type": "integer", "minimum": 0, "maximum": 100});
        let outcome = validate_json(b"150", &schema).unwrap();
        assert!(!outcome.valid);
    }
}
