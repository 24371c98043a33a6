//! # Literary Companion CLI (`litc`)
//!
//! ```bash
//! litc --config ./config/litc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `litc init` | Create the SQLite database and run schema migrations |
//! | `litc extract` | Unpack an archive into a directory |
//! | `litc ingest` | Extract, cleanse, write outputs, and store works |
//! | `litc works` | List stored works of the configured author |
//! | `litc show <title>` | Print a stored work |
//! | `litc chat` | Talk with the author persona about a work |
//! | `litc summarize` | Summarize a conversation |
//! | `litc score` | Score a conversation on five axes |
//! | `litc record` | Create or update a conversation record |
//! | `litc records` | List conversation records |
//! | `litc push` | Upload outputs and the database to S3 |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `literary_companion=info`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use literary_companion::chat::{self, ChatCommand};
use literary_companion::config;
use literary_companion::ingest::{self, IngestOptions};
use literary_companion::migrate;
use literary_companion::models::Scores;
use literary_companion::progress::ProgressMode;
use literary_companion::records::{self, RecordArgs};
use literary_companion::s3;
use literary_companion::works;

/// Literary Companion: Aozora Bunko text cleansing and reading conversations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/litc.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "litc", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/litc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Unpack an archive into a directory, clearing it first.
    ///
    /// A `__MACOSX` folder in the destination is left alone.
    Extract {
        /// Destination directory.
        dest: PathBuf,

        /// Archive path or URL (defaults to `archive.source`).
        #[arg(long)]
        source: Option<String>,
    },

    /// Run one extraction + cleanse pass and store the works.
    Ingest {
        /// Archive path or URL (defaults to `archive.source`).
        #[arg(long)]
        source: Option<String>,

        /// Decode and cleanse only; write no files or rows.
        #[arg(long)]
        dry_run: bool,

        /// Clear the `org/` and `edit/` output directories first.
        #[arg(long)]
        clean: bool,

        /// Progress on stderr (default: human when stderr is a terminal).
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// List stored works of the configured author.
    Works,

    /// Print a stored work.
    Show {
        title: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Send one message to the author persona.
    Chat {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        message: String,
    },

    /// Summarize a conversation and store the summary.
    Summarize {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
    },

    /// Score a conversation and store the scores.
    Score {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
    },

    /// Create or update a conversation record.
    ///
    /// Without `--id` the record is keyed by user and title.
    Record {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,

        /// Update the record with this id instead.
        #[arg(long)]
        id: Option<i64>,

        #[arg(long)]
        summary: Option<String>,

        /// JSON transcript file.
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// `creativity,logic,empathy,expression,insight`, each 0-10.
        #[arg(long, value_parser = parse_scores_arg)]
        scores: Option<Scores>,
    },

    /// List conversation records.
    Records {
        /// Only this user's records.
        #[arg(long)]
        user: Option<String>,

        /// Print one record as JSON.
        #[arg(long)]
        id: Option<i64>,
    },

    /// Upload the output directory and the database to S3.
    Push {
        /// List what would be uploaded.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

fn parse_scores_arg(s: &str) -> Result<Scores, String> {
    records::parse_scores(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("literary_companion=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Extract { dest, source } => {
            ingest::run_extract(&cfg, source.as_deref(), &dest).await?;
        }
        Commands::Ingest {
            source,
            dry_run,
            clean,
            progress,
        } => {
            let mode = match progress {
                Some(ProgressArg::Off) => ProgressMode::Off,
                Some(ProgressArg::Human) => ProgressMode::Human,
                Some(ProgressArg::Json) => ProgressMode::Json,
                None => ProgressMode::default_for_tty(),
            };
            let opts = IngestOptions {
                source,
                dry_run,
                clean,
            };
            ingest::run_ingest(&cfg, &opts, mode.reporter().as_ref()).await?;
        }
        Commands::Works => {
            works::run_works(&cfg).await?;
        }
        Commands::Show { title, json } => {
            works::run_show(&cfg, &title, json).await?;
        }
        Commands::Chat {
            user,
            title,
            message,
        } => {
            chat::run_chat_command(&cfg, &user, &title, ChatCommand::Say(&message)).await?;
        }
        Commands::Summarize { user, title } => {
            chat::run_chat_command(&cfg, &user, &title, ChatCommand::Summarize).await?;
        }
        Commands::Score { user, title } => {
            chat::run_chat_command(&cfg, &user, &title, ChatCommand::Score).await?;
        }
        Commands::Record {
            user,
            title,
            id,
            summary,
            transcript,
            scores,
        } => {
            let args = RecordArgs {
                id,
                username: user,
                title,
                summary,
                transcript,
                scores,
            };
            records::run_record(&cfg, &args).await?;
        }
        Commands::Records { user, id } => {
            records::run_records(&cfg, user.as_deref(), id).await?;
        }
        Commands::Push { dry_run } => {
            s3::run_push(&cfg, dry_run).await?;
        }
    }

    Ok(())
}
