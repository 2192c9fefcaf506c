pub mod agent;
pub mod batch;
pub mod chat;
pub mod config;
pub mod models;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nim", version = "0.1.0", about = "NVIDIA NIM batch runner and tool-calling agent")]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a JSON batch of chat/completion/embedding/vision/model-list items
    Batch {
        /// JSON file holding an array of request items
        #[arg(long, short)]
        input: PathBuf,
        /// Record failed items in place instead of aborting (overrides [batch])
        #[arg(long)]
        continue_on_failure: bool,
        /// Write results here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Run the tool-calling agent once, or over a JSON file of inputs
    Agent {
        /// Model id (owner/model-name); defaults to [agent] model
        #[arg(long)]
        model: Option<String>,
        /// Input text
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,
        /// JSON file holding an array of {"text": ...} items
        #[arg(long)]
        input: Option<PathBuf>,
        /// System message override
        #[arg(long)]
        system: Option<String>,
        /// Maximum prompting cycles (1-50)
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Include the tool-call trace in the output
        #[arg(long)]
        steps: bool,
        /// Keep going when an input fails (with --input)
        #[arg(long)]
        continue_on_failure: bool,
    },
    /// Interactive REPL over the agent loop, with conversation memory
    Chat {
        /// Model id (owner/model-name); defaults to [agent] model
        #[arg(long)]
        model: Option<String>,
    },
    /// List available models
    Models {
        /// List vision-capable models instead of chat models
        #[arg(long)]
        vision: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Generate a default config file
    Init,
}
