//! Tool schema normalization

use serde_json::{Number, Value};

/// Constraint keywords whose values must be numbers
const NUMERIC_KEYWORDS: &[&str] = &[
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "minProperties",
    "maxProperties",
];

/// Keywords holding a map of named sub-schemas
const SCHEMA_MAPS: &[&str] = &["properties", "$defs", "definitions", "patternProperties"];

/// Keywords holding a single sub-schema or an array of them
const SCHEMA_SLOTS: &[&str] = &["items", "additionalProperties", "not", "anyOf", "oneOf", "allOf", "prefixItems"];

/// Normalize a JSON schema for `OpenAI`-compatible backends
///
/// Type names are lowercased (`OBJECT` to `object`) and numeric
/// constraints given as strings are turned into numbers, recursively
/// through nested schemas. The input is left untouched.
pub fn normalize_schema(schema: &Value) -> Value {
    let mut normalized = schema.clone();
    normalize_in_place(&mut normalized);
    normalized
}

fn normalize_in_place(schema: &mut Value) {
    match schema {
        Value::Array(items) => items.iter_mut().for_each(normalize_in_place),
        Value::Object(map) => {
            match map.get_mut("type") {
                Some(Value::String(name)) => *name = name.to_ascii_lowercase(),
                Some(Value::Array(names)) => {
                    for name in names {
                        if let Value::String(name) = name {
                            *name = name.to_ascii_lowercase();
                        }
                    }
                }
                _ => {}
            }

            for keyword in NUMERIC_KEYWORDS {
                if let Some(value) = map.get_mut(*keyword)
                    && let Value::String(text) = &*value
                    && let Some(number) = parse_number(text)
                {
                    *value = Value::Number(number);
                }
            }

            for keyword in SCHEMA_MAPS {
                if let Some(Value::Object(children)) = map.get_mut(*keyword) {
                    children.values_mut().for_each(normalize_in_place);
                }
            }

            for keyword in SCHEMA_SLOTS {
                if let Some(child) = map.get_mut(*keyword) {
                    normalize_in_place(child);
                }
            }
        }
        _ => {}
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Number::from(integer));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lowercases_types_and_coerces_constraints() {
        let original = json!({
            "type": "OBJECT",
            "properties": {
                "count": {"type": "INTEGER", "minimum": "1", "maximum": "10"},
                "tags": {
                    "type": "ARRAY",
                    "maxItems": "5",
                    "items": {"type": "STRING", "maxLength": "32"}
                },
                "ratio": {"type": "NUMBER", "multipleOf": "0.5"}
            },
            "additionalProperties": {"type": "BOOLEAN"}
        });

        let normalized = normalize_schema(&original);

        assert_eq!(
            normalized,
            json!({
                "type": "object",
                "properties": {
                    "count": {"type": "integer", "minimum": 1, "maximum": 10},
                    "tags": {
                        "type": "array",
                        "maxItems": 5,
                        "items": {"type": "string", "maxLength": 32}
                    },
                    "ratio": {"type": "number", "multipleOf": 0.5}
                },
                "additionalProperties": {"type": "boolean"}
            })
        );
    }

    #[test]
    fn caller_schema_is_not_mutated() {
        let original = json!({"type": "OBJECT", "minProperties": "1"});
        let _ = normalize_schema(&original);
        assert_eq!(original, json!({"type": "OBJECT", "minProperties": "1"}));
    }

    #[test]
    fn walks_combinators() {
        let normalized = normalize_schema(&json!({
            "anyOf": [{"type": "STRING", "minLength": "2"}, {"type": ["NULL", "INTEGER"]}]
        }));
        assert_eq!(
            normalized,
            json!({"anyOf": [{"type": "string", "minLength": 2}, {"type": ["null", "integer"]}]})
        );
    }

    #[test]
    fn non_numeric_strings_are_kept() {
        let normalized = normalize_schema(&json!({"type": "string", "minLength": "short"}));
        assert_eq!(normalized["minLength"], json!("short"));
    }
}
