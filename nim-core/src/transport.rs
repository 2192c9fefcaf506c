//! Transport Collaborator
//!
//! The core never talks HTTP itself. It hands fully assembled JSON bodies to
//! a [`Transport`] together with the shared [`Credentials`]; the concrete
//! client lives in the `nim-provider-openai` plugin.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default NVIDIA-hosted endpoint.
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API key and base URL, fetched once per batch and shared read-only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Join `path` onto the base URL without doubling or dropping the slash.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// OpenAI-compatible endpoints the core dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    ChatCompletions,
    Completions,
    Embeddings,
    Models,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "/chat/completions",
            Endpoint::Completions => "/completions",
            Endpoint::Embeddings => "/embeddings",
            Endpoint::Models => "/models",
        }
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Black-box JSON transport. Implementations must send
/// `Authorization: Bearer {api_key}` on every call and enforce their own
/// timeouts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET {base_url}{path}` and return the decoded JSON body.
    async fn get_json(&self, credentials: &Credentials, path: &str) -> Result<Value>;

    /// `POST {base_url}{path}` with a JSON body and return the decoded JSON body.
    async fn post_json(&self, credentials: &Credentials, path: &str, body: &Value)
        -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_with_single_slash() {
        let creds = Credentials::new("k", "https://integrate.api.nvidia.com/v1/");
        assert_eq!(
            creds.url("/chat/completions"),
            "https://integrate.api.nvidia.com/v1/chat/completions"
        );

        let creds = Credentials::new("k", "http://localhost:8000/v1");
        assert_eq!(creds.url("models"), "http://localhost:8000/v1/models");
    }

    #[test]
    fn debug_redacts_api_key() {
        let creds = Credentials::new("nvapi-secret", DEFAULT_BASE_URL);
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("nvapi-secret"));
        assert!(rendered.contains("integrate.api.nvidia.com"));
        assert_eq!(creds.bearer(), "Bearer nvapi-secret");
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(Endpoint::ChatCompletions.path(), "/chat/completions");
        assert_eq!(Endpoint::Completions.path(), "/completions");
        assert_eq!(Endpoint::Embeddings.path(), "/embeddings");
        assert_eq!(Endpoint::Models.path(), "/models");
    }
}
