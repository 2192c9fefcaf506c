//! Message Builder
//!
//! Assembles the ordered conversation sent to the provider from raw turn
//! entries, injects the system prompt into the first user turn, and
//! normalizes image input for the vision request kind. Also owns the wire
//! serialization of messages, including the assistant tool-call and
//! tool-result messages produced by the agent loop.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{NimError, Result};
use crate::types::{
    ContentPart, ImageUrl, Message, MessageContent, Role, ToolCallResult,
};

/// Raw text shorter than this is not accepted as base64 image data.
const MIN_RAW_IMAGE_LEN: usize = 100;

/// One conversation turn as the caller supplied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl RawTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: Option<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name,
        }
    }
}

/// Whether empty sequences and blank turns are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Batch behavior: empty input and blank turns fail.
    #[default]
    Strict,
    /// Forward turns as-is; only structural problems fail.
    Lenient,
}

/// Build the provider conversation from raw turns.
///
/// Turns keep their input order. A non-empty `system_prompt` is prepended
/// to the first user turn and dropped when there is none.
pub fn build_messages(
    turns: &[RawTurn],
    system_prompt: Option<&str>,
    mode: ValidationMode,
) -> Result<Vec<Message>> {
    if mode == ValidationMode::Strict && turns.is_empty() {
        return Err(NimError::validation("at least one message is required"));
    }

    let system_prompt = system_prompt.filter(|p| !p.is_empty());
    let mut injected = false;
    let mut messages = Vec::with_capacity(turns.len());

    for (i, turn) in turns.iter().enumerate() {
        let position = i + 1;
        if mode == ValidationMode::Strict && turn.content.trim().is_empty() {
            return Err(NimError::validation(format!(
                "message {} has empty content",
                position
            )));
        }

        let message = match turn.role {
            Role::Tool => {
                let tool_call_id = turn
                    .tool_call_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        NimError::validation(format!(
                            "message {} has role 'tool' but no tool_call_id",
                            position
                        ))
                    })?;
                Message::tool_result(ToolCallResult {
                    tool_call_id: tool_call_id.to_string(),
                    tool_name: turn.tool_name.clone(),
                    content: turn.content.clone(),
                    is_error: false,
                })
            }
            Role::User => match system_prompt {
                Some(prompt) if !injected => {
                    injected = true;
                    Message::user(format!("{}\n\n{}", prompt, turn.content))
                }
                _ => Message::user(turn.content.clone()),
            },
            role => Message {
                role,
                content: MessageContent::Text(turn.content.clone()),
            },
        };
        messages.push(message);
    }

    Ok(messages)
}

// ---------------------------------------------------------------------------
// Image input
// ---------------------------------------------------------------------------

/// Normalize caller image input into a URL the provider accepts.
pub fn normalize_image(image_data: &str) -> Result<String> {
    let data = image_data.trim();
    if data.is_empty() {
        return Err(NimError::validation("image data is required"));
    }

    if data.starts_with("data:image/") {
        if !data.contains("base64,") {
            return Err(NimError::validation("invalid data URL format"));
        }
        return Ok(data.to_string());
    }

    if data.starts_with("http://") || data.starts_with("https://") {
        return Ok(data.to_string());
    }

    if data.len() < MIN_RAW_IMAGE_LEN {
        return Err(NimError::validation(
            "image data appears too short to be valid",
        ));
    }
    Ok(format!("data:image/jpeg;base64,{}", data))
}

/// Multi-part user message carrying a prompt and one image.
pub fn vision_message(prompt: &str, image_data: &str) -> Result<Message> {
    let url = normalize_image(image_data)?;
    Ok(Message {
        role: Role::User,
        content: MessageContent::Parts(vec![
            ContentPart::Text {
                text: prompt.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]),
    })
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// OpenAI-compatible JSON for one message.
pub fn wire_message(msg: &Message) -> Value {
    let role = msg.role.as_str();
    match &msg.content {
        MessageContent::Text(text) => json!({ "role": role, "content": text }),
        MessageContent::Parts(parts) => json!({ "role": role, "content": parts }),
        MessageContent::ToolCalls { text, calls } => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": text, "tool_calls": tool_calls })
        }
        MessageContent::ToolResult(result) => {
            let mut value = json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id,
                "content": result.content,
            });
            if let Some(ref name) = result.tool_name {
                value["name"] = Value::String(name.clone());
            }
            value
        }
    }
}

pub fn wire_messages(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(wire_message).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
