use crate::agent::{AgentLoop, AgentRunParams, LoopStopReason};
use crate::config::Config;
use crate::events::{EventBus, StreamChunk, UiEvent};
use crate::llm::create_provider;
use crate::permissions::{
    ApprovalGate, ApprovalResponse, FilePermissionStore, PermissionEngine, PermissionMode,
    PermissionStore,
};
use crate::tools::{ExecutionContext, InMemoryTaskStore, ToolExecutor, default_registry};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const WORKSPACE_ID: &str = "default";

#[derive(Parser)]
#[command(name = "opspilot", version, about = "Permission-gated multi-provider LLM agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a message to the agent and stream the reply
    Chat {
        /// The user message
        message: String,
        /// Provider name (anthropic, openai, gemini, custom:<url>)
        #[arg(long)]
        provider: Option<String>,
        /// Model id or short alias
        #[arg(long)]
        model: Option<String>,
        /// Permission mode for this run: safe | ask | allow-all
        #[arg(long)]
        mode: Option<String>,
        /// Disable tool use for this run
        #[arg(long)]
        no_tools: bool,
        /// Override the configured turn limit
        #[arg(long)]
        max_turns: Option<u32>,
    },
    /// Print the resolved configuration
    Config,
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat {
            message,
            provider,
            model,
            mode,
            no_tools,
            max_turns,
        } => {
            run_chat(ChatArgs {
                config,
                message,
                provider,
                model,
                mode,
                no_tools,
                max_turns,
            })
            .await
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)?;
            println!("{rendered}");
            Ok(())
        }
    }
}

struct ChatArgs {
    config: Config,
    message: String,
    provider: Option<String>,
    model: Option<String>,
    mode: Option<String>,
    no_tools: bool,
    max_turns: Option<u32>,
}

async fn run_chat(args: ChatArgs) -> Result<()> {
    let provider_name = args.provider.unwrap_or_else(|| args.config.provider.clone());
    let model = args.model.unwrap_or_else(|| args.config.model.clone());
    let mode_name = args.mode.unwrap_or_else(|| args.config.default_mode.clone());
    let mode = PermissionMode::from_str(&mode_name)
        .map_err(|_| anyhow::anyhow!("unknown permission mode '{mode_name}'"))?;

    let workspace_dir = args.config.workspace_path();
    std::fs::create_dir_all(&workspace_dir)
        .with_context(|| format!("failed to create workspace '{}'", workspace_dir.display()))?;

    let provider = Arc::from(create_provider(
        &provider_name,
        args.config.api_key.as_deref(),
    )?);

    let bus = EventBus::new();
    let store = Arc::new(FilePermissionStore::load(&workspace_dir));
    store.volatile().set_workspace_mode(WORKSPACE_ID, mode);

    let gate = Arc::new(ApprovalGate::new(
        store.clone() as Arc<dyn PermissionStore>,
        bus.clone(),
        Duration::from_secs(args.config.approval_timeout_secs),
    ));
    let engine = Arc::new(PermissionEngine::new(
        store as Arc<dyn PermissionStore>,
        gate.clone(),
    ));

    let registry = default_registry(Arc::new(InMemoryTaskStore::new()));
    let executor = Arc::new(ToolExecutor::new(Arc::new(registry), engine, bus.clone()));

    let chat_id = uuid::Uuid::new_v4().to_string();
    let mut ctx = ExecutionContext::new(WORKSPACE_ID, &chat_id, workspace_dir);
    if args.no_tools {
        ctx.allowed_tools = Some(std::collections::HashSet::new());
    }

    // Terminal UI collaborator: renders chunks and answers approval
    // requests. Must be subscribed before the loop starts or the gate
    // fails closed.
    let listener = tokio::spawn(terminal_listener(bus.subscribe(), gate));

    let agent_loop = AgentLoop::new(
        provider,
        executor,
        bus.clone(),
        args.max_turns.unwrap_or(args.config.max_turns),
    );
    let result = agent_loop
        .run(AgentRunParams {
            system_prompt: None,
            user_message: &args.message,
            model: &model,
            thinking_enabled: false,
            ctx: &ctx,
            conversation_history: &[],
        })
        .await?;

    drop(bus);
    listener.abort();
    println!();

    match result.stop_reason {
        LoopStopReason::Completed => Ok(()),
        LoopStopReason::MaxTurns => {
            eprintln!(
                "{}",
                style(format!("stopped after {} turns (limit reached)", result.turns)).yellow()
            );
            Ok(())
        }
        LoopStopReason::Error(message) => Err(anyhow::anyhow!(message)),
    }
}

/// Render bus events to the terminal and resolve approval requests with
/// interactive prompts.
async fn terminal_listener(
    mut rx: tokio::sync::broadcast::Receiver<UiEvent>,
    gate: Arc<ApprovalGate>,
) {
    while let Ok(event) = rx.recv().await {
        match event {
            UiEvent::Chunk { chunk, .. } => render_chunk(&chunk),
            UiEvent::ApprovalRequested {
                id,
                category,
                operation,
                details,
            } => {
                let gate = gate.clone();
                tokio::task::spawn_blocking(move || {
                    let response = prompt_for_approval(&id, &category, &operation, details.as_deref());
                    gate.resolve(response);
                });
            }
            UiEvent::ToolSideEffect { notification, .. } => {
                eprintln!("{}", style(format!("• {}", notification.summary)).dim());
            }
        }
    }
}

fn render_chunk(chunk: &StreamChunk) {
    match chunk {
        StreamChunk::Text { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        StreamChunk::Thinking { text } => {
            eprint!("{}", style(text).dim());
        }
        StreamChunk::ToolUseStart { name } => {
            eprintln!("\n{}", style(format!("→ running {name}")).cyan());
        }
        StreamChunk::ToolResult { name, is_error } => {
            if *is_error {
                eprintln!("{}", style(format!("✗ {name} failed")).red());
            }
        }
        StreamChunk::Error { message } => {
            eprintln!("{}", style(format!("error: {message}")).red());
        }
        StreamChunk::Complete => {}
    }
}

fn prompt_for_approval(
    id: &str,
    category: &str,
    operation: &str,
    details: Option<&str>,
) -> ApprovalResponse {
    eprintln!(
        "\n{} {category}: {operation}",
        style("approval required").yellow().bold()
    );
    if let Some(details) = details {
        eprintln!("  {details}");
    }

    let approved = dialoguer::Confirm::new()
        .with_prompt("Allow this operation?")
        .default(false)
        .interact()
        .unwrap_or(false);

    let (remember, pattern) = if approved {
        let remember = dialoguer::Confirm::new()
            .with_prompt("Remember this decision?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if remember {
            let pattern: String = dialoguer::Input::new()
                .with_prompt("Pattern to remember")
                .default(operation.to_string())
                .interact_text()
                .unwrap_or_else(|_| operation.to_string());
            (true, Some(pattern))
        } else {
            (false, None)
        }
    } else {
        (false, None)
    };

    ApprovalResponse {
        id: id.to_string(),
        approved,
        remember,
        pattern,
    }
}
