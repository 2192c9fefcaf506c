//! Model Resolver
//!
//! Turns a model reference into a concrete model id, and serves the
//! searchable model list. The list path never fails: a listing error
//! degrades to a built-in fallback list.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{NimError, Result};
use crate::transport::{Credentials, Endpoint, Transport};

// ---------------------------------------------------------------------------
// Model references
// ---------------------------------------------------------------------------

/// How a model reference was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorMode {
    /// Picked from the searchable list.
    List,
    /// Typed as a free-text `owner/model-name` id.
    Id,
}

/// A model reference: either a plain id string or a `{mode, value}` locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelRef {
    Plain(String),
    Locator {
        mode: LocatorMode,
        #[serde(default)]
        value: Option<String>,
    },
}

fn model_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+/[A-Za-z0-9_.-]+$").expect("model id pattern compiles")
    })
}

/// Check a free-text id against `owner/model-name`.
pub fn validate_model_id(id: &str) -> Result<String> {
    if model_id_pattern().is_match(id) {
        Ok(id.to_string())
    } else {
        Err(NimError::validation(format!(
            "model id '{}' must be in format: owner/model-name",
            id
        )))
    }
}

/// Resolve a reference to the concrete model id sent to the provider.
///
/// `id` mode (and plain strings) are pattern-checked; `list` values were
/// picked from the catalog and are used as-is.
pub fn resolve_model(model: &ModelRef) -> Result<String> {
    match model {
        ModelRef::Plain(id)
        | ModelRef::Locator {
            mode: LocatorMode::Id,
            value: Some(id),
        } => validate_model_id(id),
        ModelRef::Locator {
            mode: LocatorMode::List,
            value: Some(value),
        } if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(NimError::validation("invalid model parameter")),
    }
}

// ---------------------------------------------------------------------------
// Model listing
// ---------------------------------------------------------------------------

/// Which listing is being served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogVariant {
    /// Chat-capable models (embedding and rerank models excluded).
    #[default]
    Chat,
    /// Vision-capable Llama models for image analysis.
    Vision,
}

/// One selectable entry of the model list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    /// Human label, e.g. "Llama 3.1 8B Instruct".
    pub name: String,
    /// Model id, e.g. "meta/llama-3.1-8b-instruct".
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Sorted list of selectable models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub results: Vec<ModelOption>,
}

impl ModelList {
    pub fn to_json(&self) -> Value {
        let results: Vec<Value> = self
            .results
            .iter()
            .map(|m| {
                let mut entry = serde_json::json!({ "name": m.name, "value": m.value });
                if let Some(ref d) = m.description {
                    entry["description"] = Value::String(d.clone());
                }
                entry
            })
            .collect();
        serde_json::json!({ "results": results })
    }
}

/// Why a listing call could not produce a list.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("model listing request failed: {0:#}")]
    Request(anyhow::Error),
    #[error("malformed model listing: {0}")]
    Malformed(String),
}

/// Vendor and family tokens with canonical casing.
const VENDOR_CASING: &[(&str, &str)] = &[
    ("llama", "Llama"),
    ("mixtral", "Mixtral"),
    ("mistral", "Mistral"),
    ("meta", "Meta"),
    ("nvidia", "NVIDIA"),
    ("neva", "NeVA"),
    ("fuyu", "Fuyu"),
    ("kosmos", "Kosmos"),
    ("vila", "VILA"),
    ("microsoft", "Microsoft"),
];

/// `^\d+[bk]$`, case-insensitive.
fn is_size_token(word: &str) -> bool {
    let Some(last) = word.chars().last() else {
        return false;
    };
    let digits = &word[..word.len() - last.len_utf8()];
    matches!(last, 'b' | 'B' | 'k' | 'K')
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}

fn format_token(word: &str) -> String {
    let lower = word.to_lowercase();
    if let Some((_, canonical)) = VENDOR_CASING.iter().find(|(k, _)| *k == lower) {
        return canonical.to_string();
    }
    if is_size_token(word) {
        return word.to_uppercase();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human label for a model id: `meta/llama-3.1-8b-instruct` → `Llama 3.1 8B Instruct`.
pub fn format_model_label(model_id: &str) -> String {
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    name.split('-').map(format_token).collect::<Vec<_>>().join(" ")
}

fn accepts(variant: CatalogVariant, model_id: &str) -> bool {
    match variant {
        CatalogVariant::Chat => !model_id.contains("embed") && !model_id.contains("rerank"),
        CatalogVariant::Vision => {
            let lower = model_id.to_lowercase();
            lower.contains("llama") && lower.contains("vision")
        }
    }
}

/// Build a sorted list from a raw `GET /models` body.
pub fn models_from_listing(
    body: &Value,
    variant: CatalogVariant,
) -> std::result::Result<ModelList, ListError> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ListError::Malformed("expected a 'data' array".to_string()))?;

    let mut results: Vec<ModelOption> = data
        .iter()
        .filter_map(|entry| {
            let id = entry
                .get("id")
                .or_else(|| entry.get("model"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if id.is_empty() || !accepts(variant, id) {
                return None;
            }
            let name = format_model_label(id);
            let description = match variant {
                CatalogVariant::Chat => Some(
                    entry
                        .get("description")
                        .and_then(|d| d.as_str())
                        .filter(|d| !d.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{} model", name)),
                ),
                CatalogVariant::Vision => None,
            };
            Some(ModelOption {
                name,
                value: id.to_string(),
                description,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(ModelList { results })
}

/// Built-in list returned whenever the listing call fails.
pub fn fallback_models(variant: CatalogVariant) -> ModelList {
    let entries: &[(&str, &str)] = match variant {
        CatalogVariant::Chat => &[
            ("Llama 3.1 8B Instruct", "meta/llama-3.1-8b-instruct"),
            ("Llama 3.1 70B Instruct", "meta/llama-3.1-70b-instruct"),
            ("Llama 3.1 405B Instruct", "meta/llama-3.1-405b-instruct"),
            ("Mixtral 8x7B Instruct", "mistralai/mixtral-8x7b-instruct-v0.1"),
        ],
        CatalogVariant::Vision => &[
            ("Llama 3.2 11B Vision", "meta/llama-3.2-11b-vision-instruct"),
            ("Llama 3.2 90B Vision", "meta/llama-3.2-90b-vision-instruct"),
        ],
    };
    ModelList {
        results: entries
            .iter()
            .map(|(name, value)| ModelOption {
                name: name.to_string(),
                value: value.to_string(),
                description: None,
            })
            .collect(),
    }
}

/// Collapse a listing result into a list, substituting the fallback on error.
pub fn with_fallback(
    result: std::result::Result<ModelList, ListError>,
    variant: CatalogVariant,
) -> ModelList {
    result.unwrap_or_else(|err| {
        warn!(err = %err, ?variant, "model listing failed, using built-in list");
        fallback_models(variant)
    })
}

/// Issue the listing call and build the list. May fail.
pub async fn fetch_models(
    transport: &dyn Transport,
    credentials: &Credentials,
    variant: CatalogVariant,
) -> std::result::Result<ModelList, ListError> {
    let body = transport
        .get_json(credentials, Endpoint::Models.path())
        .await
        .map_err(ListError::Request)?;
    let list = models_from_listing(&body, variant)?;
    debug!(count = list.results.len(), ?variant, "fetched model list");
    Ok(list)
}

/// Searchable model list. Never fails.
pub async fn list_models(
    transport: &dyn Transport,
    credentials: &Credentials,
    variant: CatalogVariant,
) -> ModelList {
    with_fallback(fetch_models(transport, credentials, variant).await, variant)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
