//! NIM Relay CLI
//!
//! Binary entry point. Provides:
//! - `batch`: run a JSON file of request items with per-item failure isolation
//! - `agent`: one tool-calling agent run, or an agent batch
//! - `chat`: interactive REPL over the agent loop
//! - `models`: list chat or vision models
//! - `config`: configuration management

mod commands;
mod runtime;
mod tools;

use anyhow::Result;
use clap::Parser;

use nim_core::config::NimConfig;

use crate::commands::agent::run_agent_command;
use crate::commands::batch::run_batch_command;
use crate::commands::chat::run_chat_mode;
use crate::commands::config::run_config_command;
use crate::commands::models::run_models_command;
use crate::commands::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Logging goes to stderr; stdout carries results.
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(is_tty)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("❌ nim: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("   caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        NimConfig::load_from(path)?
    } else {
        NimConfig::load_default()?
    };

    match cli.command {
        Commands::Batch {
            input,
            continue_on_failure,
            output,
        } => run_batch_command(config, &input, continue_on_failure, output.as_deref()).await,
        Commands::Agent {
            model,
            text,
            input,
            system,
            max_iterations,
            steps,
            continue_on_failure,
        } => {
            run_agent_command(
                config,
                commands::agent::AgentArgs {
                    model,
                    text,
                    input,
                    system,
                    max_iterations,
                    steps,
                    continue_on_failure,
                },
            )
            .await
        }
        Commands::Chat { model } => run_chat_mode(config, model).await,
        Commands::Models { vision } => run_models_command(config, vision).await,
        Commands::Config { action } => run_config_command(action, config),
    }
}
