//! Configuration
//!
//! TOML-based configuration: credentials, batch failure policy, agent loop
//! defaults and transport settings. Includes startup validation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent_loop::{AgentLoopConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_SYSTEM_MESSAGE};
use crate::batch::FailurePolicy;
use crate::options::OptionsInput;
use crate::retry::RetryPolicy;
use crate::tool_schema::ToolChoice;
use crate::transport::{Credentials, DEFAULT_BASE_URL};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "NVIDIA_API_KEY";

pub const DEFAULT_MODEL: &str = "meta/llama-3.1-8b-instruct";

// ---------------------------------------------------------------------------
// Configuration structures
// ---------------------------------------------------------------------------

/// Top-level configuration (maps to TOML).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NimConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub batch: BatchSettings,

    /// Agent loop settings.
    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// API key. If absent, falls back to `NVIDIA_API_KEY`.
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Record failed items in place instead of aborting the batch.
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model used when none is given on the command line.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum prompting cycles per run (default 10, range 1-50).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_system_message")]
    pub system_message: String,
    #[serde(default)]
    pub return_intermediate_steps: bool,
    /// Sent with every agent request that declares tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// `[agent.options]`: sampling options for the agent's chat model.
    #[serde(default)]
    pub options: OptionsInput,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_iterations: default_max_iterations(),
            system_message: default_system_message(),
            return_intermediate_steps: false,
            tool_choice: None,
            options: OptionsInput::default(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Per-request timeout in milliseconds (default 120000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry policy settings.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    120_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl NimConfig {
    /// Load config from the default location, falling back to defaults
    /// when no file exists.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            info!("no config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        info!(path = %path.display(), base_url = %config.credentials.base_url, "loaded config");
        Ok(config)
    }

    /// `{config_dir}/nim-relay/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        Ok(dir.join("nim-relay").join("config.toml"))
    }

    /// Configured key, else `NVIDIA_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key_or(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_or(&self, env_value: Option<String>) -> Option<String> {
        self.credentials
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or(env_value.filter(|k| !k.trim().is_empty()))
    }

    /// Credentials shared by every call of a run.
    pub fn credentials(&self) -> Result<Credentials> {
        let api_key = self.resolve_api_key().with_context(|| {
            format!(
                "No API key. Set {} environment variable or add api_key under [credentials]",
                API_KEY_ENV
            )
        })?;
        Ok(Credentials::new(api_key, self.credentials.base_url.clone()))
    }

    /// Validate the config on startup. Returns a list of warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.resolve_api_key().is_none() {
            bail!(
                "No API key. Set {} environment variable or add api_key under [credentials]",
                API_KEY_ENV
            );
        }

        let base_url = &self.credentials.base_url;
        if base_url.starts_with("http://") {
            warnings.push(format!("base_url '{}' is not using TLS", base_url));
        } else if !base_url.starts_with("https://") {
            bail!("base_url must start with http:// or https://, got '{}'", base_url);
        }

        if let Err(e) = self.agent_loop_config().validate() {
            bail!("[agent] {}", e);
        }

        if self.transport.timeout_ms == 0 {
            bail!("[transport] timeout_ms must be greater than 0");
        }

        Ok(warnings)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::from_continue_on_failure(self.batch.continue_on_failure)
    }

    pub fn agent_loop_config(&self) -> AgentLoopConfig {
        AgentLoopConfig {
            max_iterations: self.agent.max_iterations,
            return_intermediate_steps: self.agent.return_intermediate_steps,
            system_message: self.agent.system_message.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.transport.retry.clone()
    }
}

// ---------------------------------------------------------------------------
// Config generation (for `config init`)
// ---------------------------------------------------------------------------

/// Generate a sample config TOML string.
pub fn sample_config() -> String {
    r#"# nim-relay configuration

[credentials]
# api_key = "nvapi-..."  # Or set NVIDIA_API_KEY env var
base_url = "https://integrate.api.nvidia.com/v1"

[batch]
# Record failed items in place instead of aborting the whole batch
continue_on_failure = false

[agent]
model = "meta/llama-3.1-8b-instruct"
max_iterations = 10
return_intermediate_steps = false
# system_message = "You are a helpful AI assistant powered by NVIDIA NIM."
# tool_choice = "auto"  # auto | none | required

[agent.options]
# Unset fields fall back to temperature 0.7 and max_tokens 1024
# temperature = 0.7
# top_p = 1.0
# max_tokens = 1024
# frequency_penalty = 0.0
# presence_penalty = 0.0
# response_format = "json_object"

[transport]
timeout_ms = 120000

[transport.retry]
max_retries = 2
base_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0
"#
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
