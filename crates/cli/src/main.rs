//! PhysRAG CLI
//!
//! Question answering over a physics textbook collection.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{ChatCommand, ExplainCommand, HealthCommand, SearchCommand, SimilarCommand, StatsCommand};
use physrag_core::logging::{self, LogFormat};
use physrag_core::{AppResult, RagConfig};
use physrag_knowledge::RagEngine;
use std::path::PathBuf;

/// PhysRAG - grounded answers from physics textbooks
#[derive(Parser, Debug)]
#[command(name = "physrag")]
#[command(about = "Grounded question answering over physics textbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "PHYSRAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: <workspace>/physrag.yaml)
    #[arg(short, long, global = true, env = "PHYSRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Hybrid weight: 1.0 = pure vector, 0.0 = pure keyword
    #[arg(long, global = true)]
    alpha: Option<f32>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank textbook passages for a query
    Search(SearchCommand),

    /// Ask a question and get a grounded answer
    Chat(ChatCommand),

    /// Explain a physics concept
    Explain(ExplainCommand),

    /// Find passages semantically close to a text
    Similar(SimilarCommand),

    /// Check provider reachability
    Health(HealthCommand),

    /// Show engine configuration and corpus size
    Stats(StatsCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Search(_) => "search",
            Commands::Chat(_) => "chat",
            Commands::Explain(_) => "explain",
            Commands::Similar(_) => "similar",
            Commands::Health(_) => "health",
            Commands::Stats(_) => "stats",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Flags win over the process environment for workspace and config file
    let workspace = cli.workspace.clone();
    let config_file = cli.config.clone();
    let config = RagConfig::load_with(|key| match key {
        "PHYSRAG_WORKSPACE" if workspace.is_some() => {
            workspace.as_ref().map(|p| p.display().to_string())
        }
        "PHYSRAG_CONFIG" if config_file.is_some() => {
            config_file.as_ref().map(|p| p.display().to_string())
        }
        _ => std::env::var(key).ok(),
    })?
    .with_overrides(cli.log_level, cli.verbose, cli.no_color, cli.alpha);

    let format = config
        .logging
        .format
        .as_deref()
        .map(LogFormat::parse)
        .unwrap_or_default();
    let no_color = config.logging.color == Some(false);
    logging::init_logging(config.logging.level.as_deref(), format, no_color)?;

    tracing::info!("PhysRAG CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    if let Some(file) = &config.config_file {
        tracing::debug!("Config file: {:?}", file);
    }

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let engine = RagEngine::from_config(&config)?;
    let json = cli.json;

    let result = match cli.command {
        Commands::Search(cmd) => cmd.execute(&engine, json).await,
        Commands::Chat(cmd) => cmd.execute(&engine, json).await,
        Commands::Explain(cmd) => cmd.execute(&engine, json).await,
        Commands::Similar(cmd) => cmd.execute(&engine, json).await,
        Commands::Health(cmd) => cmd.execute(&engine, json).await,
        Commands::Stats(cmd) => cmd.execute(&engine, json).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
