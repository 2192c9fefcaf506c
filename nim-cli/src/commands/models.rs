use anyhow::Result;

use nim_core::config::NimConfig;
use nim_core::model_resolver::{list_models, CatalogVariant};

use crate::runtime::build_runtime;

pub async fn run_models_command(config: NimConfig, vision: bool) -> Result<()> {
    let runtime = build_runtime(config)?;
    let variant = if vision {
        CatalogVariant::Vision
    } else {
        CatalogVariant::Chat
    };

    let list = list_models(runtime.transport.as_ref(), &runtime.credentials, variant).await;
    println!("{:<48} {}", "MODEL", "NAME");
    println!("{}", "-".repeat(80));
    for model in &list.results {
        println!("{:<48} {}", model.value, model.name);
    }
    Ok(())
}
