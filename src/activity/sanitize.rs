//! Filtering of activity payloads before they leave the process.

use serde_json::{Map, Value};

/// Longest string kept in an activity payload, in characters.
pub const MAX_STRING_LEN: usize = 500;

#[derive(Clone, Copy)]
enum FieldType {
    Number,
    String,
    Bool,
    StringOrNumber,
}

const ALLOWED_FIELDS: &[(&str, FieldType)] = &[
    ("percent", FieldType::Number),
    ("percentage", FieldType::Number),
    ("loaded", FieldType::StringOrNumber),
    ("total", FieldType::StringOrNumber),
    ("speed", FieldType::String),
    ("elapsed", FieldType::Number),
    ("estimated", FieldType::Bool),
    ("downloadedFormatted", FieldType::String),
    ("totalFormatted", FieldType::String),
    ("sizeFormatted", FieldType::String),
    ("filename", FieldType::String),
    ("size", FieldType::Number),
    ("status", FieldType::String),
    ("error", FieldType::String),
    ("message", FieldType::String),
    ("engine", FieldType::String),
    ("result", FieldType::String),
];

fn accepts(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Number => value.is_number(),
        FieldType::String => value.is_string(),
        FieldType::Bool => value.is_boolean(),
        FieldType::StringOrNumber => value.is_string() || value.is_number(),
    }
}

/// Keeps only whitelisted, correctly typed fields of an object payload.
///
/// `percent` is clamped to `0..=100` and strings are cut to
/// [`MAX_STRING_LEN`] characters. Non-object payloads pass through untouched.
pub fn sanitize(data: Value) -> Value {
    let Value::Object(fields) = data else {
        return data;
    };

    let mut cleaned = Map::new();
    for (key, value) in fields {
        let Some((_, field_type)) = ALLOWED_FIELDS.iter().find(|(name, _)| *name == key) else {
            continue;
        };
        if !accepts(*field_type, &value) {
            continue;
        }

        let value = match value {
            Value::Number(n) if key == "percent" => {
                let clamped = n.as_f64().unwrap_or(0.0).clamp(0.0, 100.0);
                if n.as_f64() == Some(clamped) {
                    Value::Number(n)
                } else {
                    Value::from(clamped)
                }
            }
            Value::String(s) if s.chars().count() > MAX_STRING_LEN => {
                Value::String(s.chars().take(MAX_STRING_LEN).collect())
            }
            other => other,
        };
        cleaned.insert(key, value);
    }

    Value::Object(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_are_dropped() {
        let cleaned = sanitize(json!({
            "engine": "clamav",
            "status": "starting",
            "password": "hunter2",
            "stack": ["frame"]
        }));
        assert_eq!(cleaned, json!({"engine": "clamav", "status": "starting"}));
    }

    #[test]
    fn test_wrong_types_and_nulls_are_dropped() {
        let cleaned = sanitize(json!({
            "percent": "50",
            "size": null,
            "estimated": true,
            "loaded": 1024,
            "total": "2 MB"
        }));
        assert_eq!(
            cleaned,
            json!({"estimated": true, "loaded": 1024, "total": "2 MB"})
        );
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(sanitize(json!({"percent": 140})), json!({"percent": 100.0}));
        assert_eq!(sanitize(json!({"percent": -3.5})), json!({"percent": 0.0}));
        assert_eq!(sanitize(json!({"percent": 42})), json!({"percent": 42}));
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let long = "x".repeat(800);
        let cleaned = sanitize(json!({"message": long}));
        assert_eq!(cleaned["message"].as_str().unwrap().len(), MAX_STRING_LEN);
    }

    #[test]
    fn test_non_objects_pass_through() {
        assert_eq!(sanitize(Value::Null), Value::Null);
        assert_eq!(sanitize(json!("text")), json!("text"));
        assert_eq!(sanitize(json!([1, 2])), json!([1, 2]));
    }
}
