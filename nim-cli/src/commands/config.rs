use anyhow::{Context, Result};
use nim_core::config::{self, NimConfig};

use crate::commands::ConfigAction;

pub fn run_config_command(action: ConfigAction, mut config: NimConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            if config.credentials.api_key.is_some() {
                config.credentials.api_key = Some("<redacted>".into());
            }
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
        }
        ConfigAction::Init => {
            let path = NimConfig::default_path()?;
            if path.exists() {
                eprintln!("Config already exists at: {}", path.display());
                eprintln!("Edit it directly or delete it first.");
            } else {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::write(&path, config::sample_config())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("✅ Config written to: {}", path.display());
                eprintln!("   Edit it to add your API key, or set NVIDIA_API_KEY.");
            }
        }
    }
    Ok(())
}
