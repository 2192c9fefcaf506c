//! Request Kinds
//!
//! Closed set of per-item request kinds. Each kind carries its own typed
//! parameters and a pure `prepare_*` function that assembles the provider
//! body; [`RequestKind::execute`] is the dispatch table that sends it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{NimError, Result};
use crate::messages::{build_messages, vision_message, wire_message, wire_messages, RawTurn, ValidationMode};
use crate::model_resolver::{list_models, resolve_model, CatalogVariant, ModelRef};
use crate::options::{map_options, OptionsInput};
use crate::tool_schema::{compile_all, tool_request_fields, ToolChoice, ToolSpecInput};
use crate::transport::{Credentials, Endpoint, Transport};

pub const DEFAULT_VISION_PROMPT: &str = "Describe this image in detail.";

fn default_vision_prompt() -> String {
    DEFAULT_VISION_PROMPT.to_string()
}

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    pub model: ModelRef,
    #[serde(default)]
    pub messages: Vec<RawTurn>,
    #[serde(default)]
    pub tools: Vec<ToolSpecInput>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub options: OptionsInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: ModelRef,
    pub prompt: String,
    #[serde(default)]
    pub options: OptionsInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    pub model: ModelRef,
    pub input: EmbeddingInput,
    /// `query` or `passage` for retrieval models.
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub encoding_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionParams {
    pub model: ModelRef,
    pub image_data: String,
    #[serde(default = "default_vision_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub options: OptionsInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListParams {
    #[serde(default)]
    pub variant: CatalogVariant,
}

/// One work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Chat(ChatParams),
    Completion(CompletionParams),
    Embedding(EmbeddingParams),
    Vision(VisionParams),
    ModelList(ModelListParams),
}

/// A fully assembled outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub endpoint: Endpoint,
    pub model: String,
    pub body: Value,
}

fn with_fields(mut body: Map<String, Value>, extra: Map<String, Value>) -> Value {
    body.extend(extra);
    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Preparation (pure)
// ---------------------------------------------------------------------------

/// Resolve model, build messages, compile tools, map options.
pub fn prepare_chat(params: &ChatParams) -> Result<PreparedRequest> {
    let model = resolve_model(&params.model)?;
    let messages = build_messages(
        &params.messages,
        params.options.system_prompt.as_deref(),
        ValidationMode::Strict,
    )?;
    let tools = compile_all(&params.tools)?;

    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert("messages".into(), Value::Array(wire_messages(&messages)));
    body.extend(tool_request_fields(&tools, params.tool_choice));
    let body = with_fields(body, map_options(&params.options));

    Ok(PreparedRequest {
        endpoint: Endpoint::ChatCompletions,
        model,
        body,
    })
}

pub fn prepare_completion(params: &CompletionParams) -> Result<PreparedRequest> {
    let model = resolve_model(&params.model)?;
    if params.prompt.trim().is_empty() {
        return Err(NimError::validation("prompt is required"));
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert("prompt".into(), json!(params.prompt));
    let body = with_fields(body, map_options(&params.options));

    Ok(PreparedRequest {
        endpoint: Endpoint::Completions,
        model,
        body,
    })
}

pub fn prepare_embedding(params: &EmbeddingParams) -> Result<PreparedRequest> {
    let model = resolve_model(&params.model)?;
    let input = match &params.input {
        EmbeddingInput::Single(text) if text.trim().is_empty() => {
            return Err(NimError::validation("embedding input is required"))
        }
        EmbeddingInput::Single(text) => json!(text),
        EmbeddingInput::Batch(items) if items.is_empty() => {
            return Err(NimError::validation("embedding input is required"))
        }
        EmbeddingInput::Batch(items) => {
            if let Some(pos) = items.iter().position(|s| s.trim().is_empty()) {
                return Err(NimError::validation(format!(
                    "embedding input {} is empty",
                    pos + 1
                )));
            }
            json!(items)
        }
    };

    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert("input".into(), input);
    if let Some(ref input_type) = params.input_type {
        body.insert("input_type".into(), json!(input_type));
    }
    if let Some(ref format) = params.encoding_format {
        body.insert("encoding_format".into(), json!(format));
    }

    Ok(PreparedRequest {
        endpoint: Endpoint::Embeddings,
        model,
        body: Value::Object(body),
    })
}

/// Non-streaming chat call with one multi-part user message.
pub fn prepare_vision(params: &VisionParams) -> Result<PreparedRequest> {
    let model = resolve_model(&params.model)?;
    let prompt = if params.prompt.trim().is_empty() {
        DEFAULT_VISION_PROMPT
    } else {
        params.prompt.as_str()
    };
    let message = vision_message(prompt, &params.image_data)?;

    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert("messages".into(), json!([wire_message(&message)]));
    body.extend(map_options(&params.options.sampling_only()));
    body.insert("stream".into(), json!(false));

    Ok(PreparedRequest {
        endpoint: Endpoint::ChatCompletions,
        model,
        body: Value::Object(body),
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The model of an unparsed item, as entered. Accepts a plain string or a
/// `{mode, value}` locator.
pub fn raw_model_hint(raw: &Value) -> Option<String> {
    match raw.get("model")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(locator) => locator.get("value")?.as_str().map(str::to_string),
        _ => None,
    }
}

impl RequestKind {
    /// Parse one batch item. A malformed item is a validation error for that
    /// item alone.
    pub fn from_value(raw: &Value) -> Result<Self> {
        RequestKind::deserialize(raw)
            .map_err(|e| NimError::validation(format!("invalid request item: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Chat(_) => "chat",
            RequestKind::Completion(_) => "completion",
            RequestKind::Embedding(_) => "embedding",
            RequestKind::Vision(_) => "vision",
            RequestKind::ModelList(_) => "model_list",
        }
    }

    /// Assemble the outbound call. `ModelList` has no body and returns `None`.
    pub fn prepare(&self) -> Result<Option<PreparedRequest>> {
        let prepared = match self {
            RequestKind::Chat(p) => prepare_chat(p)?,
            RequestKind::Completion(p) => prepare_completion(p)?,
            RequestKind::Embedding(p) => prepare_embedding(p)?,
            RequestKind::Vision(p) => prepare_vision(p)?,
            RequestKind::ModelList(_) => return Ok(None),
        };
        Ok(Some(prepared))
    }

    /// Prepare and send exactly one outbound call, returning the raw
    /// response body.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        credentials: &Credentials,
    ) -> Result<Value> {
        if let RequestKind::ModelList(p) = self {
            let list = list_models(transport, credentials, p.variant).await;
            return Ok(list.to_json());
        }

        let Some(prepared) = self.prepare()? else {
            return Err(NimError::validation("request kind has no body"));
        };
        debug!(
            kind = self.name(),
            model = %prepared.model,
            endpoint = prepared.endpoint.path(),
            "dispatching request"
        );
        transport
            .post_json(credentials, prepared.endpoint.path(), &prepared.body)
            .await
            .map_err(NimError::Transport)
    }
}
