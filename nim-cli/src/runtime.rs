use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use nim_core::config::NimConfig;
use nim_core::model_resolver::ModelRef;
use nim_core::provider::LlmProvider;
use nim_core::transport::{Credentials, Transport};
use nim_provider_openai::{HttpTransport, NimChatModel};

/// Transport and credentials shared by every call of one command.
pub struct Runtime {
    pub config: NimConfig,
    pub transport: Arc<dyn Transport>,
    pub credentials: Credentials,
}

impl Runtime {
    /// The chat model for `model`, or the configured default, carrying the
    /// `[agent]` options and tool choice.
    pub fn chat_model(&self, model: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let agent = &self.config.agent;
        let model = model.unwrap_or(&agent.model);
        let mut chat = NimChatModel::from_ref(
            self.transport.clone(),
            self.credentials.clone(),
            &ModelRef::Plain(model.to_string()),
        )?
        .with_options(agent.options.clone());
        if let Some(choice) = agent.tool_choice {
            chat = chat.with_tool_choice(choice);
        }
        Ok(Arc::new(chat))
    }
}

/// Validate the config and build the HTTP transport.
pub fn build_runtime(config: NimConfig) -> Result<Runtime> {
    let warnings = config.validate().with_context(|| {
        format!(
            "invalid configuration. Run `nim config init` or edit {}",
            NimConfig::default_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.toml".into())
        )
    })?;
    for w in &warnings {
        warn!("⚠️  {}", w);
    }

    let credentials = config.credentials()?;
    let transport = HttpTransport::from_config(&config).context("failed to initialize HTTP transport")?;
    info!(
        base_url = %credentials.base_url,
        timeout_ms = config.transport.timeout_ms,
        max_retries = config.transport.retry.max_retries,
        "runtime initialized"
    );

    Ok(Runtime {
        config,
        transport: Arc::new(transport),
        credentials,
    })
}
