//! Lumina CLI, a terminal host for the note agent.
//!
//! Commands:
//! - `init`    : write a default config file
//! - `run`     : run one agent task against a workspace
//! - `index`   : build or refresh the retrieval index
//! - `search`  : semantic search over indexed notes
//! - `status`  : show configuration and index status
//! - `config`  : print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(
    name = "lumina",
    about = "Lumina note agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a default config file to ~/.lumina/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Run one agent task
    Run {
        /// What the agent should do
        task: String,

        /// Workspace root (defaults to the configured workspace)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Workspace-relative path of the note to treat as open
        #[arg(short, long)]
        note: Option<String>,

        /// Plan the task before executing it
        #[arg(long)]
        plan: bool,

        /// Run write tools without asking
        #[arg(long)]
        auto_approve: bool,
    },

    /// Index markdown notes for semantic search
    Index {
        /// Rebuild the index from scratch
        #[arg(long)]
        full: bool,

        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Search indexed notes
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        min_score: Option<f32>,

        /// Only return results under this directory
        #[arg(short, long)]
        dir: Option<String>,

        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Show configuration and index status
    Status {
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Init { force } => commands::init::run(force).await?,
        Commands::Run {
            task,
            workspace,
            note,
            plan,
            auto_approve,
        } => {
            commands::run::run(commands::run::RunArgs {
                task,
                workspace,
                note,
                plan,
                auto_approve,
            })
            .await?
        }
        Commands::Index { full, workspace } => commands::index::run(full, workspace).await?,
        Commands::Search {
            query,
            limit,
            min_score,
            dir,
            workspace,
        } => commands::search::run(&query, limit, min_score, dir, workspace).await?,
        Commands::Status { workspace } => commands::status::run(workspace).await?,
        Commands::Config => commands::config_cmd::run()?,
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only model output.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
