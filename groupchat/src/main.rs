//! Group chat CLI
//!
//! Runs a configured group of agents against a task and streams their turns.
//!
//! Usage:
//!   groupchat run --task "Build a calculator app"
//!   groupchat run --task "..." --config ./team.toml --max-turns 10
//!   groupchat agents list
//!   groupchat agents show ProductOwner

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groupchat::{Capability, GroupChatFileConfig, OllamaCapability, RunStatus, TurnRecord};

#[derive(Parser)]
#[command(name = "groupchat")]
#[command(about = "Multi-agent group chat orchestration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a config file (default: search for .groupchat.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, env = "OLLAMA_URL", global = true)]
    ollama_url: Option<String>,

    /// Default model to use
    #[arg(short = 'm', long, env = "OLLAMA_MODEL", global = true)]
    model: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the group chat on a task
    Run {
        /// Task description
        #[arg(long, short)]
        task: String,

        /// Maximum number of agent turns
        #[arg(long)]
        max_turns: Option<usize>,

        /// Number of recent messages each agent sees
        #[arg(long)]
        history: Option<usize>,

        /// Approval token that ends the conversation
        #[arg(long)]
        token: Option<String>,

        /// Per-call capability timeout in seconds (0 disables it)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Agent management
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List configured agents
    List,
    /// Show agent configuration
    Show {
        /// Agent name
        agent: String,
    },
}

/// Initialize tracing with the given verbosity level
///
/// - 0: warn (default)
/// - 1: info (-v)
/// - 2: debug (-vv)
/// - 3+: trace (-vvv)
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // Allow RUST_LOG to override if set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI first to get verbosity before initializing tracing
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut file_config = match &cli.config {
        Some(path) => GroupChatFileConfig::load_from_path(path)?,
        None => GroupChatFileConfig::load()?,
    };

    if let Some(url) = cli.ollama_url {
        file_config.llm.url = url;
    }
    if let Some(model) = cli.model {
        file_config.llm.model = model;
    }

    match cli.command {
        Commands::Run {
            task,
            max_turns,
            history,
            token,
            timeout_secs,
        } => {
            if let Some(max_turns) = max_turns {
                file_config.run.max_turns = max_turns;
            }
            if let Some(history) = history {
                file_config.run.target_history_count = history;
            }
            if let Some(token) = token {
                file_config.run.approval_token = token;
            }
            if timeout_secs.is_some() {
                file_config.run.capability_timeout_secs = timeout_secs;
            }
            run_chat(&file_config, task).await
        }
        Commands::Agents { command } => run_agents_command(command, &file_config),
    }
}

async fn run_chat(file_config: &GroupChatFileConfig, task: String) -> Result<()> {
    if file_config.agents.is_empty() {
        bail!("No agents configured. Add [[agents]] entries to .groupchat.toml");
    }

    let ollama_url = file_config.llm.url.clone();
    let chat = file_config
        .build(|model: &str, temperature: Option<f32>| {
            let mut capability = OllamaCapability::new(&ollama_url, model);
            if let Some(temperature) = temperature {
                capability = capability.with_temperature(temperature);
            }
            Arc::new(capability) as Arc<dyn Capability>
        })
        .context("Failed to assemble group chat")?;

    let mut handle = chat.start_run(task);
    tracing::info!(run_id = %handle.run_id(), "Started group chat run");

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });

    while let Some(turn) = handle.next_turn().await {
        print_turn(&turn);
    }

    let outcome = handle.finish().await.context("Group chat task panicked")?;

    println!("\nStatus: {:?}", outcome.status);
    println!(
        "Turns: {} ({} failed)",
        outcome.turns.len(),
        outcome.failed_turns()
    );

    match outcome.status {
        RunStatus::Failed(failure) => bail!("Run failed: {}", failure),
        _ => Ok(()),
    }
}

fn print_turn(turn: &TurnRecord) {
    println!("\n--- Turn {} [{}] ---", turn.turn_index, turn.agent);
    if turn.is_error {
        println!("(error) {}", turn.content);
    } else {
        println!("{}", turn.content);
    }
}

fn run_agents_command(command: AgentCommands, file_config: &GroupChatFileConfig) -> Result<()> {
    match command {
        AgentCommands::List => {
            if file_config.agents.is_empty() {
                println!("No agents configured.");
                return Ok(());
            }
            println!("Configured Agents:\n");
            for agent in &file_config.agents {
                let model = agent.model.as_deref().unwrap_or(&file_config.llm.model);
                println!("  {} ({}) - {}", agent.name, model, agent.label());
            }
        }

        AgentCommands::Show { agent } => {
            let Some(config) = file_config.agents.iter().find(|a| a.name == agent) else {
                bail!(
                    "Agent '{}' not found. Use 'groupchat agents list' to see configured agents.",
                    agent
                );
            };
            println!("Agent: {}\n", config.name);
            println!("Display Name: {}", config.label());
            println!(
                "Model: {}",
                config.model.as_deref().unwrap_or(&file_config.llm.model)
            );
            println!("Temperature: {}", config.temperature);
            println!("\nPersona:\n{}", config.persona);
        }
    }

    Ok(())
}
