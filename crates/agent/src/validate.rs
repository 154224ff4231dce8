//! A small structural JSON Schema checker.
//!
//! The decoder only needs a yes/no answer against the schemas this crate
//! produces itself, so this handles the keywords those schemas use:
//! `type`, `properties`, `required`, `additionalProperties`, `items`,
//! `anyOf`, `const`, `enum`, and local `$ref`. Unknown keywords are
//! ignored rather than rejected.

use serde_json::Value;

/// Check `value` against `schema`. Returns false on any violation,
/// including an unresolvable local `$ref`.
pub fn validate(value: &Value, schema: &Value) -> bool {
    validate_at(value, schema, schema)
}

fn validate_at(value: &Value, schema: &Value, root: &Value) -> bool {
    let Some(schema) = schema.as_object() else {
        // `true`/`false` schemas; anything else passes vacuously.
        return schema.as_bool().unwrap_or(true);
    };

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let Some(resolved) = resolve_ref(reference, root) else {
            return false;
        };
        return validate_at(value, resolved, root);
    }

    if let Some(expected) = schema.get("const") {
        if value != expected {
            return false;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return false;
        }
    }

    if let Some(variants) = schema.get("anyOf").and_then(Value::as_array) {
        if !variants.iter().any(|v| validate_at(value, v, root)) {
            return false;
        }
    }

    if let Some(type_spec) = schema.get("type") {
        if !matches_type(value, type_spec) {
            return false;
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required {
                let Some(name) = field.as_str() else {
                    return false;
                };
                if !object.contains_key(name) {
                    return false;
                }
            }
        }
        let properties = schema.get("properties").and_then(Value::as_object);
        if let Some(properties) = properties {
            for (name, field_value) in object {
                if let Some(field_schema) = properties.get(name) {
                    if !validate_at(field_value, field_schema, root) {
                        return false;
                    }
                }
            }
        }
        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            for name in object.keys() {
                if !properties.is_some_and(|p| p.contains_key(name)) {
                    return false;
                }
            }
        }
    }

    if let (Some(items), Some(schema_items)) = (value.as_array(), schema.get("items")) {
        if !items.iter().all(|item| validate_at(item, schema_items, root)) {
            return false;
        }
    }

    true
}

fn matches_type(value: &Value, type_spec: &Value) -> bool {
    match type_spec {
        Value::String(name) => matches_type_name(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(value, name)),
        _ => true,
    }
}

fn matches_type_name(value: &Value, name: &str) -> bool {
    match name {
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

fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    let path = reference.strip_prefix("#/")?;
    let mut current = root;
    for segment in path.split('/') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_checks() {
        assert!(validate(&json!("hi"), &json!({ "type": "string" })));
        assert!(!validate(&json!(3), &json!({ "type": "string" })));
        assert!(validate(&json!(3), &json!({ "type": "integer" })));
        assert!(!validate(&json!(3.5), &json!({ "type": "integer" })));
        assert!(validate(&json!(3.5), &json!({ "type": "number" })));
        assert!(validate(&json!(null), &json!({ "type": "null" })));
    }

    #[test]
    fn type_arrays_accept_any_listed_type() {
        let schema = json!({ "type": ["string", "null"] });
        assert!(validate(&json!("hi"), &schema));
        assert!(validate(&json!(null), &schema));
        assert!(!validate(&json!(7), &schema));
    }

    #[test]
    fn required_and_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"],
        });
        assert!(validate(&json!({ "name": "a" }), &schema));
        assert!(!validate(&json!({}), &schema));
        assert!(!validate(&json!({ "name": 1 }), &schema));
        // unlisted keys pass when additionalProperties is unset
        assert!(validate(&json!({ "name": "a", "extra": 1 }), &schema));
    }

    #[test]
    fn additional_properties_false_rejects_unknown_keys() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "additionalProperties": false,
        });
        assert!(validate(&json!({ "name": "a" }), &schema));
        assert!(!validate(&json!({ "name": "a", "extra": 1 }), &schema));
    }

    #[test]
    fn const_and_enum() {
        assert!(validate(&json!("a"), &json!({ "const": "a" })));
        assert!(!validate(&json!("b"), &json!({ "const": "a" })));
        assert!(validate(&json!("b"), &json!({ "enum": ["a", "b"] })));
        assert!(!validate(&json!("c"), &json!({ "enum": ["a", "b"] })));
    }

    #[test]
    fn any_of_passes_when_one_variant_matches() {
        let schema = json!({ "anyOf": [{ "type": "string" }, { "type": "null" }] });
        assert!(validate(&json!("hi"), &schema));
        assert!(validate(&json!(null), &schema));
        assert!(!validate(&json!(1), &schema));
    }

    #[test]
    fn items_apply_to_every_element() {
        let schema = json!({ "type": "array", "items": { "type": "integer" } });
        assert!(validate(&json!([1, 2, 3]), &schema));
        assert!(!validate(&json!([1, "two"]), &schema));
    }

    #[test]
    fn local_refs_resolve_against_the_root() {
        let schema = json!({
            "type": "object",
            "properties": { "inner": { "$ref": "#/definitions/Inner" } },
            "definitions": {
                "Inner": { "type": "object", "required": ["x"] },
            },
        });
        assert!(validate(&json!({ "inner": { "x": 1 } }), &schema));
        assert!(!validate(&json!({ "inner": {} }), &schema));
    }

    #[test]
    fn unresolvable_ref_fails() {
        let schema = json!({ "$ref": "#/definitions/Missing" });
        assert!(!validate(&json!({}), &schema));
    }

    #[test]
    fn unknown_keywords_are_ignored() {
        let schema = json!({ "type": "string", "minLength": 100, "pattern": "^z" });
        assert!(validate(&json!("hi"), &schema));
    }
}
