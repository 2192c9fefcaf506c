//! LLM Provider Trait and Types
//!
//! Defines the `LlmProvider` trait the agent loop drives, the response
//! types it returns, and the parser for OpenAI-compatible chat responses.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Message, ToolCallRequest, ToolDefinition};

// ---------------------------------------------------------------------------
// LLM response types
// ---------------------------------------------------------------------------

/// Information about the model behind a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier (e.g. "meta/llama-3.1-70b-instruct").
    pub name: String,
    /// Provider name (e.g. "nim").
    pub provider_name: String,
}

/// Token usage for a single LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Why the LLM stopped generating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Response from an LLM provider `complete()` call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content (may be empty if only tool calls).
    pub content: String,
    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Why the model stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Chat model driven by the agent loop.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "nim").
    fn name(&self) -> &str;

    /// Send one non-streaming completion request with the current
    /// conversation and the available tool descriptors.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition])
        -> Result<LlmResponse>;

    /// Return metadata about the active model.
    fn model_info(&self) -> ModelInfo;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible response parsing
// ---------------------------------------------------------------------------

/// Parse a `/chat/completions` response body into an [`LlmResponse`].
///
/// Tool-call arguments arrive as JSON text; unparseable arguments become
/// `null` and are sanitized by the agent loop.
pub fn parse_chat_response(parsed: &Value) -> Result<LlmResponse> {
    let choice = parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .context("response has no choices")?;
    let message = choice.get("message").context("choice has no message")?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCallRequest> = message
        .get("tool_calls")
        .and_then(|tc| tc.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let func = tc.get("function")?;
                    Some(ToolCallRequest {
                        id: tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        name: func
                            .get("name")
                            .and_then(|n| n.as_str())
                            .unwrap_or("")
                            .to_string(),
                        arguments: match func.get("arguments") {
                            Some(Value::String(s)) => {
                                serde_json::from_str(s).unwrap_or(Value::Null)
                            }
                            Some(other) => other.clone(),
                            None => Value::Null,
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ if !tool_calls.is_empty() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage_field = |name: &str| {
        parsed
            .get("usage")
            .and_then(|u| u.get(name))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize
    };

    Ok(LlmResponse {
        content,
        tool_calls,
        stop_reason,
        usage: TokenUsage {
            input_tokens: usage_field("prompt_tokens"),
            output_tokens: usage_field("completion_tokens"),
            total_tokens: usage_field("total_tokens"),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
