//! # ragsync CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragsync init` | Create the owner's index namespace |
//! | `ragsync sync` | Incremental sync from the configured source |
//! | `ragsync sync --full` | Reprocess every listed file |
//! | `ragsync ask "<question>"` | Answer from the owner's documents |
//! | `ragsync status` | Index and sync-state summary |
//! | `ragsync reset` | Drop the owner's chunks and sync state |
//! | `ragsync completions <shell>` | Print shell completions |
//!
//! Logs go to stderr (`RUST_LOG` overrides the level); results go to stdout.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ragsync::config::{self, Config};
use ragsync::progress::ProgressMode;
use ragsync::{ask, status, sync_cmd};
use ragsync_core::sync::SyncMode;

/// Sync a user's documents into a vector index and answer questions over them.
#[derive(Parser)]
#[command(name = "ragsync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragsync.toml")]
    config: PathBuf,

    /// Owner to act for. Overrides `[owner] key`.
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Debug logging (unless RUST_LOG is set).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Sync progress on stderr. Defaults to human when stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the owner's index namespace. Safe to run repeatedly.
    Init,

    /// Sync the configured source into the owner's index.
    ///
    /// Only new and modified files are processed; files gone from the
    /// source are removed from the index.
    Sync {
        /// Reprocess every listed file and skip deletions.
        #[arg(long)]
        full: bool,

        /// Print the pass report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the owner's documents.
    Ask {
        question: String,

        /// Passages to retrieve. Defaults to `[retrieval] top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Also print the context sent to the model.
        #[arg(long)]
        context: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show what is indexed for the owner.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Remove the owner's chunks and sync state.
    Reset,

    /// Print shell completions.
    Completions { shell: Shell },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ragsync=debug,ragsync_core=debug"
    } else {
        "ragsync=info,ragsync_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "ragsync",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    init_tracing(cli.verbose);

    let cfg: Config = config::load_config(&cli.config)?;
    let owner = cfg.resolve_owner(cli.owner.as_deref())?;

    match cli.command {
        Commands::Init => sync_cmd::run_init(&cfg, &owner).await?,
        Commands::Sync { full, json } => {
            let mode = if full { SyncMode::Full } else { SyncMode::Incremental };
            let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            let report = sync_cmd::run_sync(&cfg, &owner, mode, progress, json).await?;
            if !report.is_clean() {
                anyhow::bail!("sync finished with failures");
            }
        }
        Commands::Ask {
            question,
            top_k,
            context,
            json,
        } => {
            ask::run_ask(&cfg, &owner, &question, top_k, context, json).await?;
        }
        Commands::Status { json } => status::run_status(&cfg, &owner, json).await?,
        Commands::Reset => sync_cmd::run_reset(&cfg, &owner).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
