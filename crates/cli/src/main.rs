//! faqroute CLI
//!
//! Main entry point for the faqroute command-line tool.
//! Answers questions from a FAQ index or structured data, once from the
//! command line or continuously over HTTP.

mod commands;
mod runtime;

use clap::{Parser, Subcommand};
use commands::{AskCommand, PromptsCommand, ServeCommand};
use faqroute_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// faqroute - route questions to FAQ answers or structured data
#[derive(Parser, Debug)]
#[command(name = "faqroute")]
#[command(about = "Route questions to FAQ answers or structured data", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "FAQROUTE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "FAQROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (openai, ollama)
    #[arg(short, long, global = true, env = "FAQROUTE_PROVIDER")]
    provider: Option<String>,

    /// Chat model identifier
    #[arg(short, long, global = true, env = "FAQROUTE_MODEL")]
    model: Option<String>,

    /// Dataset file with collections, records and FAQ entries
    #[arg(short, long, global = true, env = "FAQROUTE_DATA")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Serve the pipeline over HTTP
    Serve(ServeCommand),

    /// List prompt contracts
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.data,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("faqroute starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Serve(_) => "serve",
        Commands::Prompts(_) => "prompts",
    };
    let span = tracing::info_span!("command", name = command_name);

    // Route to command handlers
    let result = async {
        match cli.command {
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Serve(cmd) => cmd.execute(&config).await,
            Commands::Prompts(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
