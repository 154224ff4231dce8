//! Schema alignment: constraining the response schema to the tool set.
//!
//! Given the base response schema and the tools available this iteration,
//! `align_schema` rewrites the `action` property into a closed
//! discriminated union: one call shape per tool (a `const` on `tool_name`
//! plus that tool's argument schema) or null. Pure and deterministic;
//! recomputed every iteration because the tool set may change between
//! iterations.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};
use turnwise_core::error::{Error, Result};
use turnwise_core::tool::ToolDescriptor;

/// Align the base response schema with the given tool set.
///
/// A base schema missing `msg_to_user` or `action`, or two tools sharing
/// a name, is a configuration error reported here, before any network
/// interaction.
pub fn align_schema(base: &Value, tools: &[ToolDescriptor]) -> Result<Value> {
    let properties = base
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::config("base response schema declares no properties"))?;
    for field in ["msg_to_user", "action"] {
        if !properties.contains_key(field) {
            return Err(Error::config(format!(
                "base response schema is missing the `{field}` property"
            )));
        }
    }

    let mut seen = BTreeSet::new();
    for tool in tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(Error::config(format!(
                "duplicate tool name: `{}`",
                tool.name
            )));
        }
    }

    let mut variants: Vec<Value> = tools.iter().map(call_shape).collect();
    variants.push(json!({ "type": "null" }));

    let mut aligned = base.clone();
    aligned["properties"]["action"] = json!({ "anyOf": variants });
    Ok(aligned)
}

/// The call shape for one tool: `tool_name` pinned to a constant,
/// `arguments` conforming to the tool's argument schema.
fn call_shape(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "object",
        "properties": {
            "tool_name": { "type": "string", "const": tool.name },
            "arguments": strip_format_keys(&tool.argument_schema),
        },
        "required": ["tool_name", "arguments"],
    })
}

/// Recursively remove `format` keys from a schema. Structured-output
/// endpoints reject format annotations they cannot enforce.
fn strip_format_keys(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "format")
                .map(|(key, value)| (key.clone(), strip_format_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_format_keys).collect()),
        other => other.clone(),
    }
}
