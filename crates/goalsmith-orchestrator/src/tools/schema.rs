//! Argument validation against a tool's declared parameters.

use serde_json::Value;

use super::ToolParameters;

/// Checks `args` against `schema`.
///
/// The arguments must be an object holding every required key, each declared
/// key must carry a value of its declared JSON type, and no other keys may appear.
pub fn validate(args: &Value, schema: &ToolParameters) -> Result<(), String> {
    let Some(object) = args.as_object() else {
        return Err(format!("arguments must be a JSON object, got {}", type_name(args)));
    };

    for required in &schema.required {
        if !object.contains_key(required) {
            return Err(format!("missing required argument '{required}'"));
        }
    }

    for (key, value) in object {
        let Some(property) = schema.properties.get(key) else {
            return Err(format!("unexpected argument '{key}'"));
        };
        if value.is_null() && !schema.required.contains(key) {
            continue;
        }
        if !matches_type(value, &property.property_type) {
            return Err(format!(
                "argument '{key}' must be {}, got {}",
                property.property_type,
                type_name(value)
            ));
        }
    }
    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        // Unknown declared types are not checked.
        _ => true,
    }
}

const fn type_name(value: &Value) -> &'static str {
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

    fn schema() -> ToolParameters {
        ToolParameters::new()
            .add_property("data_source", "string", "Note id or path", true)
            .add_property("max_rows", "integer", "Row limit", false)
    }

    #[test]
    fn test_accepts_valid_arguments() {
        validate(&json!({"data_source": "note-1"}), &schema()).unwrap();
        validate(&json!({"data_source": "note-1", "max_rows": 10}), &schema()).unwrap();
        validate(&json!({"data_source": "note-1", "max_rows": null}), &schema()).unwrap();
    }

    #[test]
    fn test_rejects_missing_required() {
        let err = validate(&json!({}), &schema()).unwrap_err();
        assert!(err.contains("data_source"));
    }

    #[test]
    fn test_rejects_wrong_type() {
        let err = validate(&json!({"data_source": 7}), &schema()).unwrap_err();
        assert!(err.contains("must be string"));
        let err = validate(&json!({"data_source": "n", "max_rows": 1.5}), &schema()).unwrap_err();
        assert!(err.contains("must be integer"));
    }

    #[test]
    fn test_rejects_undeclared_keys_and_non_objects() {
        assert!(validate(&json!({"data_source": "n", "extra": true}), &schema()).is_err());
        assert!(validate(&json!(["note-1"]), &schema()).is_err());
        assert!(validate(&json!(null), &schema()).is_err());
    }
}
