//! Tool Schema Compiler
//!
//! Turns caller-declared tools into provider function-calling descriptors.
//! Compilation is per tool: one bad schema yields one error and does not
//! stop the remaining tools from compiling.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{NimError, Result};
use crate::types::ToolDefinition;

/// Parameter schema as JSON text or an already-structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaInput {
    Text(String),
    Structured(Value),
}

/// A tool as declared by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpecInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Option<SchemaInput>,
}

/// How the model may pick tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Required => "required",
        }
    }
}

fn tool_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("tool name pattern compiles"))
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn parse_schema(tool: &str, input: Option<&SchemaInput>) -> Result<Value> {
    let schema = match input {
        None => return Ok(empty_object_schema()),
        Some(SchemaInput::Text(text)) if text.trim().is_empty() => {
            return Ok(empty_object_schema())
        }
        Some(SchemaInput::Text(text)) => {
            serde_json::from_str::<Value>(text).map_err(|e| NimError::Schema {
                tool: tool.to_string(),
                message: e.to_string(),
            })?
        }
        Some(SchemaInput::Structured(value)) => value.clone(),
    };

    if !schema.is_object() {
        return Err(NimError::Schema {
            tool: tool.to_string(),
            message: "schema must be a JSON object".to_string(),
        });
    }
    Ok(schema)
}

/// Compile one declared tool.
pub fn compile_tool(spec: &ToolSpecInput) -> Result<ToolDefinition> {
    let name = spec.name.trim();
    if name.is_empty() {
        return Err(NimError::validation("tool name is required"));
    }
    if !tool_name_pattern().is_match(name) {
        return Err(NimError::validation(format!(
            "tool name '{}' may only contain letters, digits, '_' and '-' (max 64)",
            name
        )));
    }
    if spec.description.trim().is_empty() {
        return Err(NimError::validation(format!(
            "tool '{}' requires a description",
            name
        )));
    }

    Ok(ToolDefinition {
        name: name.to_string(),
        description: spec.description.clone(),
        parameters: parse_schema(name, spec.parameters.as_ref())?,
    })
}

/// Compile every tool independently, one result per input in order.
pub fn compile_tools(specs: &[ToolSpecInput]) -> Vec<Result<ToolDefinition>> {
    specs.iter().map(compile_tool).collect()
}

/// Compile every tool, failing on the first bad one.
pub fn compile_all(specs: &[ToolSpecInput]) -> Result<Vec<ToolDefinition>> {
    compile_tools(specs).into_iter().collect()
}

/// `{type: "function", function: {...}}` descriptor for one tool.
pub fn tool_descriptor(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        }
    })
}

/// Body fields for the tool set. Empty when no tools are declared, so a
/// configured `tool_choice` is never sent on its own.
pub fn tool_request_fields(
    tools: &[ToolDefinition],
    choice: Option<ToolChoice>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    if tools.is_empty() {
        return fields;
    }
    fields.insert(
        "tools".into(),
        Value::Array(tools.iter().map(tool_descriptor).collect()),
    );
    fields.insert(
        "tool_choice".into(),
        json!(choice.unwrap_or_default().as_str()),
    );
    fields
}
