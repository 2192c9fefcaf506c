//! NIM chat model
//!
//! Implements `LlmProvider` for the `/chat/completions` endpoint. Used by
//! the agent loop; sampling falls back to [`ChatDefaults`] when unset.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use nim_core::messages::wire_messages;
use nim_core::model_resolver::{resolve_model, ModelRef};
use nim_core::options::{map_options, ChatDefaults, OptionsInput};
use nim_core::provider::{parse_chat_response, LlmProvider, LlmResponse, ModelInfo};
use nim_core::tool_schema::{tool_request_fields, ToolChoice};
use nim_core::transport::{Credentials, Endpoint, Transport};
use nim_core::types::{Message, ToolDefinition};

/// Chat model bound to one model id.
pub struct NimChatModel {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    model: String,
    options: OptionsInput,
    tool_choice: Option<ToolChoice>,
    defaults: ChatDefaults,
}

impl NimChatModel {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            model: model.into(),
            options: OptionsInput::default(),
            tool_choice: None,
            defaults: ChatDefaults::default(),
        }
    }

    /// Resolve `model` first; rejects ids that are not `owner/model-name`.
    pub fn from_ref(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        model: &ModelRef,
    ) -> nim_core::error::Result<Self> {
        Ok(Self::new(transport, credentials, resolve_model(model)?))
    }

    pub fn with_options(mut self, options: OptionsInput) -> Self {
        self.options = options;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(wire_messages(messages)));
        body.extend(tool_request_fields(tools, self.tool_choice));

        let mut options = map_options(&self.options);
        self.defaults.apply(&mut options);
        body.extend(options);
        body.insert("stream".into(), json!(false));

        Value::Object(body)
    }
}

#[async_trait]
impl LlmProvider for NimChatModel {
    fn name(&self) -> &str {
        "nim"
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse> {
        let body = self.build_request_body(messages, tools);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "calling chat model");

        let parsed = self
            .transport
            .post_json(&self.credentials, Endpoint::ChatCompletions.path(), &body)
            .await?;
        parse_chat_response(&parsed)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider_name: "nim".to_string(),
        }
    }
}
