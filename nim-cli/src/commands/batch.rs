use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use nim_core::batch::{results_to_json, BatchExecutor, FailurePolicy};
use nim_core::config::NimConfig;

use crate::runtime::build_runtime;

/// Parse the outer JSON array. Items are parsed one by one when they run.
pub fn read_items(content: &str) -> Result<Vec<Value>> {
    serde_json::from_str(content).context("batch input must be a JSON array of request items")
}

pub async fn run_batch_command(
    config: NimConfig,
    input: &Path,
    continue_on_failure: bool,
    output: Option<&Path>,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read batch input: {}", input.display()))?;
    let items = read_items(&content)
        .with_context(|| format!("failed to parse batch input: {}", input.display()))?;

    let policy = if continue_on_failure {
        FailurePolicy::Continue
    } else {
        config.failure_policy()
    };

    let runtime = build_runtime(config)?;
    info!(items = items.len(), ?policy, "running batch");

    let executor = BatchExecutor::new(runtime.transport.clone(), runtime.credentials.clone(), policy);
    let results = executor.run(&items).await?;

    let rendered = serde_json::to_string_pretty(&results_to_json(&results))?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write results: {}", path.display()))?;
            eprintln!("✅ {} results written to {}", results.len(), path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
