//! JSON Schema generation for tool parameters.

use serde_json::{json, Map, Value as JsonValue};

use crate::tools::{ParamType, ToolDef};

/// Build the `inputSchema` object for a tool.
///
/// The `required` array is omitted when no parameter is required.
pub fn schema_for(tool: &ToolDef) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &tool.params {
        properties.insert(
            param.name.clone(),
            json!({
                "type": param.ty.json_type(),
                "description": describe(param.ty, &param.name),
            }),
        );
        if param.required() {
            required.push(JsonValue::String(param.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), JsonValue::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), JsonValue::Array(required));
    }
    JsonValue::Object(schema)
}

fn describe(ty: ParamType, name: &str) -> String {
    let kind = match ty {
        ParamType::String => "String",
        ParamType::Integer => "Integer",
        ParamType::Long => "Long integer",
        ParamType::Double => "Number",
        ParamType::Boolean => "Boolean",
        ParamType::Array => "Array",
        ParamType::Object => "Object",
    };
    format!("{} parameter for {}", kind, name)
}
