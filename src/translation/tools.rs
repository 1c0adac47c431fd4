// Tool translation and JSON-Schema allow-list sanitization (C1, spec §4.1).

use crate::models::anthropic::Tool as AnthropicTool;
use crate::models::gemini::{FunctionCall, FunctionDeclaration, FunctionResponse, Part as GeminiPart, ToolDeclaration};
use serde_json::Value;

/// Recursion depth bound for `clean_schema` (spec: `MAX_SCHEMA_DEPTH=32`).
const MAX_SCHEMA_DEPTH: u32 = 32;

/// Keys retained outside of a `properties` map (spec §4.1 `clean_schema`).
/// This is an allow-list, not a deny-list: anything not named here is
/// dropped, because the upstream rejects unknown schema keywords.
const ALLOWED_KEYS: &[&str] = &[
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "format",
    "nullable",
    "minimum",
    "maximum",
    "minItems",
    "maxItems",
    "minLength",
    "maxLength",
    "pattern",
    "default",
    "example",
    "title",
    "anyOf",
    "oneOf",
];

/// Translate Anthropic tools into Gemini `functionDeclarations`.
/// An empty or absent tool list yields an empty vec (no empty
/// `ToolDeclaration`, which upstream rejects).
pub fn translate_tools(tools: Vec<AnthropicTool>) -> Vec<ToolDeclaration> {
    if tools.is_empty() {
        return vec![];
    }
    vec![ToolDeclaration {
        function_declarations: tools.into_iter().map(translate_tool).collect(),
    }]
}

fn translate_tool(tool: AnthropicTool) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name,
        description: tool.description,
        parameters: Some(clean_schema(tool.input_schema)),
    }
}

/// Recursive JSON-Schema whitelist (spec §4.1). Keys directly inside a
/// `properties` map are user-defined field names and are never filtered;
/// everywhere else only `ALLOWED_KEYS` survive. Recursion is bounded at
/// `MAX_SCHEMA_DEPTH` — beyond that, the subtree is passed through
/// unfiltered rather than recursing further, defending against
/// pathologically nested schemas without failing the request.
pub fn clean_schema(schema: Value) -> Value {
    clean_schema_impl(schema, false, 0)
}

fn clean_schema_impl(value: Value, inside_properties: bool, depth: u32) -> Value {
    if depth >= MAX_SCHEMA_DEPTH {
        return value;
    }

    match value {
        Value::Object(mut map) => {
            if !inside_properties {
                map.retain(|k, _| ALLOWED_KEYS.contains(&k.as_str()));
            }

            for (key, v) in map.iter_mut() {
                let entering_properties = key == "properties";
                let taken = std::mem::replace(v, Value::Null);
                *v = clean_schema_impl(taken, entering_properties, depth + 1);
            }

            Value::Object(map)
        }
        Value::Array(arr) => Value::Array(
            arr.into_iter()
                .map(|v| clean_schema_impl(v, inside_properties, depth + 1))
                .collect(),
        ),
        other => other,
    }
}

/// `tool_use → {functionCall:{name, args}}` (spec §4.1). Signature
/// attachment (`pendingThoughtSignature`) is the caller's responsibility —
/// it is per-message state that this pure helper doesn't carry.
pub fn translate_tool_use(name: String, input: Value) -> GeminiPart {
    GeminiPart::FunctionCall {
        function_call: FunctionCall { name, args: input },
        thought_signature: None,
    }
}

/// `tool_result → {functionResponse:{name, response:{result: flatten(content)}}}`.
/// `name` is resolved by the caller via `lookupToolName`, falling back to
/// the `"unknown_tool"` sentinel on an unresolved `tool_use_id` (spec
/// invariant 2: never fail the request).
pub fn translate_tool_result(name: String, flattened_content: String, is_error: Option<bool>) -> GeminiPart {
    let response = if is_error.unwrap_or(false) {
        serde_json::json!({ "error": flattened_content })
    } else {
        serde_json::json!({ "result": flattened_content })
    };

    GeminiPart::FunctionResponse {
        function_response: FunctionResponse { name, response },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_cleaning_drops_disallowed_keys() {
        // S4: spec's concrete schema-cleaning scenario.
        let schema = json!({
            "type": "object",
            "properties": {"age": {"type": "number", "exclusiveMinimum": 0}},
            "additionalProperties": false,
            "$schema": "http://json-schema.org/draft-07/schema#"
        });

        let cleaned = clean_schema(schema);

        assert_eq!(
            cleaned,
            json!({"type": "object", "properties": {"age": {"type": "number"}}})
        );
    }

    #[test]
    fn properties_keys_are_never_filtered() {
        let schema = json!({
            "type": "object",
            "properties": {
                "$weird_but_allowed_field_name": {"type": "string"}
            }
        });
        let cleaned = clean_schema(schema);
        assert!(cleaned["properties"].get("$weird_but_allowed_field_name").is_some());
    }

    #[test]
    fn nested_schema_sanitization() {
        let schema = json!({
            "type": "object",
            "properties": {
                "nested": {"$schema": "should be removed", "type": "string"}
            }
        });
        let cleaned = clean_schema(schema);
        let nested = cleaned.get("properties").unwrap().get("nested").unwrap();
        assert!(nested.get("$schema").is_none());
        assert!(nested.get("type").is_some());
    }

    #[test]
    fn cleaning_is_idempotent() {
        let schema = json!({
            "type": "object",
            "properties": {"x": {"type": "number", "minimum": 0, "bogus": 1}},
            "bogus_top": true
        });
        let once = clean_schema(schema);
        let twice = clean_schema(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_tool_list_yields_empty_declarations() {
        assert!(translate_tools(vec![]).is_empty());
    }
}
