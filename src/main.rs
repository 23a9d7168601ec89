//! # Kancha CLI (`kancha`)
//!
//! Command-line front end for the query routing pipeline.
//!
//! ## Usage
//!
//! ```bash
//! kancha --config ./config/kancha.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kancha ask "<query>"` | Route a query: FAQ, web retrieval, governed model call |
//! | `kancha classify "<text>"` | Print the register (`en`, `ne`, `np`) |
//! | `kancha search "<query>"` | Run the web retrieval cascade only |
//! | `kancha sanitize "<text>"` | Apply the response sanitizer |
//! | `kancha faq build --seed <file>` | Embed a seed file into a FAQ corpus |
//! | `kancha faq lookup "<query>"` | Show the best FAQ match and its score |
//! | `kancha serve` | Start the HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `kancha=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kancha::commands;
use kancha::config::{self, Config};
use kancha::models::ScriptTag;
use kancha::server;

/// Kancha: register-aware query routing with FAQ cache, web retrieval,
/// and a rate-governed model call.
#[derive(Parser)]
#[command(name = "kancha", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kancha.toml`. `classify` and `sanitize` fall
    /// back to built-in defaults when the file is missing.
    #[arg(long, global = true, default_value = "./config/kancha.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query through the full pipeline.
    Ask {
        query: String,

        /// Print the full routing outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the register a text is written in.
    Classify { text: String },

    /// Run the web retrieval cascade for a query.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[retrieval] max_results`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Strip links and diagnostic markers from a text.
    Sanitize {
        text: String,

        /// Register for replacement notices: `en`, `ne`, or `np`.
        #[arg(long)]
        register: Option<ScriptTag>,
    },

    /// Manage the FAQ corpus.
    Faq {
        #[command(subcommand)]
        action: FaqAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum FaqAction {
    /// Embed every question of a seed file and write the corpus.
    Build {
        /// JSON seed: `[{"question": ..., "answers": {"en": ..., "ne": ..., "np": ...}}]`.
        #[arg(long)]
        seed: PathBuf,

        /// Output path (defaults to `[faq] corpus`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the closest FAQ entry for a query.
    Lookup { query: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kancha=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that work without a config file
    match &cli.command {
        Commands::Classify { text } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            return commands::run_classify(&cfg, text);
        }
        Commands::Sanitize { text, register } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            return commands::run_sanitize(&cfg, text, *register);
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ask { query, json } => {
            commands::run_ask(&cfg, &query, json).await?;
        }
        Commands::Search { query, limit } => {
            commands::run_search(&cfg, &query, limit).await?;
        }
        Commands::Faq { action } => match action {
            FaqAction::Build { seed, out } => {
                commands::run_faq_build(&cfg, &seed, out).await?;
            }
            FaqAction::Lookup { query } => {
                commands::run_faq_lookup(&cfg, &query).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Classify { .. } | Commands::Sanitize { .. } => {}
    }

    Ok(())
}
