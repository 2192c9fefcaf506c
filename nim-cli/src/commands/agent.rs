use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use nim_core::agent_loop::{run_agent_batch, run_agent_loop, AgentLoopConfig};
use nim_core::batch::{results_to_json, FailurePolicy};
use nim_core::config::NimConfig;

use crate::runtime::build_runtime;
use crate::tools::builtin_tools;

pub struct AgentArgs {
    pub model: Option<String>,
    pub text: Option<String>,
    pub input: Option<PathBuf>,
    pub system: Option<String>,
    pub max_iterations: Option<usize>,
    pub steps: bool,
    pub continue_on_failure: bool,
}

/// Layer command-line overrides on the configured loop settings.
pub fn loop_config(config: &NimConfig, args: &AgentArgs) -> AgentLoopConfig {
    let mut loop_config = config.agent_loop_config();
    if let Some(ref system) = args.system {
        loop_config.system_message = system.clone();
    }
    if let Some(max) = args.max_iterations {
        loop_config.max_iterations = max;
    }
    if args.steps {
        loop_config.return_intermediate_steps = true;
    }
    loop_config
}

pub async fn run_agent_command(config: NimConfig, args: AgentArgs) -> Result<()> {
    let loop_config = loop_config(&config, &args);
    loop_config.validate()?;

    let runtime = build_runtime(config)?;
    let model = runtime.chat_model(args.model.as_deref())?;
    let tools = builtin_tools();
    info!(model = %model.model_info().name, tools = tools.len(), "starting agent");

    let rendered = match (&args.text, &args.input) {
        (Some(text), _) => {
            let out = run_agent_loop(model, &tools, None, text, &loop_config).await?;
            serde_json::to_string_pretty(&out)?
        }
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read agent input: {}", path.display()))?;
            let items: Vec<serde_json::Value> = serde_json::from_str(&content)
                .with_context(|| format!("agent input must be a JSON array: {}", path.display()))?;
            let policy = if args.continue_on_failure {
                FailurePolicy::Continue
            } else {
                runtime.config.failure_policy()
            };
            let results = run_agent_batch(model, &tools, None, &items, &loop_config, policy).await?;
            serde_json::to_string_pretty(&results_to_json(&results))?
        }
        (None, None) => anyhow::bail!("either --text or --input is required"),
    };

    println!("{}", rendered);
    Ok(())
}
