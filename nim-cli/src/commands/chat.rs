use anyhow::Result;
use tracing::info;

use nim_core::agent_loop::run_agent_loop;
use nim_core::config::NimConfig;
use nim_core::memory::BufferMemory;

use crate::runtime::build_runtime;
use crate::tools::builtin_tools;

/// Exchanges kept in the REPL's conversation window.
const MEMORY_WINDOW: usize = 20;

pub async fn run_chat_mode(config: NimConfig, model: Option<String>) -> Result<()> {
    let runtime = match build_runtime(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Configuration error: {:#}", e);
            eprintln!("   Run `nim config init` to set up your configuration.");
            std::process::exit(1);
        }
    };

    let provider = runtime.chat_model(model.as_deref())?;
    let model_name = provider.model_info().name;
    let tools = builtin_tools();
    let loop_config = runtime.config.agent_loop_config();
    let memory = BufferMemory::new(MEMORY_WINDOW);

    info!(model = %model_name, "starting chat mode");
    eprintln!("🤖 nim chat");
    eprintln!("   Model: {}", model_name);
    if !tools.is_empty() {
        eprintln!("   Tools: {}", tools.names().join(", "));
    }
    eprintln!("   Type /help for commands, /quit to exit\n");

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = tokio::io::AsyncBufReadExt::lines(reader);

    loop {
        eprint!("> ");
        let line = match lines.next_line().await? {
            Some(l) => l.trim().to_string(),
            None => break,
        };

        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            match line.as_str() {
                "/quit" | "/exit" | "/q" => {
                    eprintln!("Goodbye!");
                    break;
                }
                "/help" | "/h" => {
                    eprintln!("Available commands:");
                    eprintln!("  /clear    - Forget the conversation so far");
                    eprintln!("  /context  - Show how many exchanges are remembered");
                    eprintln!("  /help     - Show this help");
                    eprintln!("  /quit     - Exit");
                }
                "/clear" => {
                    memory.clear().await;
                    eprintln!("🧹 Conversation cleared.");
                }
                "/context" => {
                    eprintln!(
                        "📊 Context: {} of {} exchanges remembered",
                        memory.len().await,
                        MEMORY_WINDOW
                    );
                }
                other => eprintln!("Unknown command: {}. Type /help for commands.", other),
            }
            continue;
        }

        match run_agent_loop(provider.clone(), &tools, Some(&memory), &line, &loop_config).await {
            Ok(out) => {
                println!("{}\n", out.output);
                info!(
                    iterations = out.iterations,
                    execution_time_ms = out.execution_time_ms,
                    tokens = out.usage.total_tokens,
                    "turn complete"
                );
            }
            Err(e) => eprintln!("❌ {}", e),
        }
    }

    Ok(())
}
