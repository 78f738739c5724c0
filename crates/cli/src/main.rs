//! AgentCanvas CLI, the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP gateway
//! - `invoke`: Run one conversation turn locally
//! - `migrate`: Create or upgrade the database schema
//! - `config`: Show, locate or validate the configuration

use agentcanvas_config::{AppConfig, LogFormat};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(
    name = "agentcanvas",
    about = "AgentCanvas: multi-agent conversation orchestration",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one conversation turn and print the reply
    Invoke {
        /// Conversation to continue (created when missing)
        #[arg(short, long)]
        conversation: Option<Uuid>,

        /// Agent that takes the turn, instead of the resolved one
        #[arg(short, long)]
        agent: Option<Uuid>,

        /// User the message is attributed to
        #[arg(short, long)]
        user: Option<String>,

        /// The user message
        text: String,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load config")?;
    init_tracing(&config, cli.verbose);
    tracing::debug!(database = %config.database_url, model = %config.default_model, "Configuration loaded");

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Invoke {
            conversation,
            agent,
            user,
            text,
        } => commands::invoke::run(config, conversation, agent, user, text).await?,
        Commands::Migrate => commands::migrate::run(&config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config),
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate(&config)?,
        },
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then `[logging] level`.
fn init_tracing(config: &AppConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}
