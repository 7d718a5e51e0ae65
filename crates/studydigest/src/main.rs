//! # StudyDigest CLI (`digest`)
//!
//! ```bash
//! digest --config ./config/digest.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `digest init` | Create the SQLite schema |
//! | `digest inspect <file>` | Size analysis and selected strategy, offline |
//! | `digest summarize <file>` | Summarize a document |
//! | `digest ingest <file> --owner <id>` | Store embedded fragments for chat |
//! | `digest ask "<question>" --owner <id>` | Answer from ingested fragments |
//! | `digest history --owner <id>` | Recent conversation turns |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use studydigest::{ask, config, history, ingest, inspect, logging, migrate, summarize};

#[derive(Parser)]
#[command(
    name = "digest",
    about = "StudyDigest: adaptive summarization and retrieval-augmented chat over study notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/digest.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Show normalized length, token estimate and the strategy a summary
    /// would use, without calling any service.
    Inspect {
        /// Text file to analyse, or `-` for stdin.
        file: PathBuf,
    },

    /// Summarize a document.
    Summarize {
        /// Text file to summarize, or `-` for stdin.
        file: PathBuf,

        /// Owner recorded on the document.
        #[arg(long, default_value = "local")]
        owner: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Split a document into fragments, embed them and store them.
    ///
    /// Re-ingesting the same document replaces its fragments; unchanged
    /// fragments keep their stored vectors.
    Ingest {
        /// Text file to ingest, or `-` for stdin.
        file: PathBuf,

        #[arg(long)]
        owner: String,

        /// Document ID. Defaults to `<owner>/<file stem>`.
        #[arg(long)]
        document: Option<String>,
    },

    /// Answer a question from ingested fragments.
    Ask {
        question: String,

        #[arg(long)]
        owner: String,

        /// Restrict retrieval to one document.
        #[arg(long)]
        document: Option<String>,

        /// Use the larger context budget.
        #[arg(long)]
        full: bool,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List recent conversation turns.
    History {
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Inspect { file } => {
            inspect::run_inspect(&cfg, &file)?;
        }
        Commands::Summarize { file, owner, json } => {
            summarize::run_summarize(&cfg, &file, &owner, json).await?;
        }
        Commands::Ingest {
            file,
            owner,
            document,
        } => {
            ingest::run_ingest(&cfg, &file, &owner, document).await?;
        }
        Commands::Ask {
            question,
            owner,
            document,
            full,
            json,
        } => {
            ask::run_ask(&cfg, &question, &owner, document, full, json).await?;
        }
        Commands::History { owner, limit } => {
            history::run_history(&cfg, &owner, limit).await?;
        }
    }

    Ok(())
}
