//! Goalsmith CLI - S.M.A.R.T. goal generation and evaluation from clinician notes
//!
//! This CLI provides a `goalsmith` command that runs the two-agent pipeline on
//! one note or a directory of notes and prints the run outcome as JSON.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Goalsmith CLI
///
/// Generates S.M.A.R.T. goals from clinician notes and scores them with an
/// LLM judge.
#[derive(Parser, Debug)]
#[command(
    name = "goalsmith",
    author,
    version,
    about = "Goalsmith - S.M.A.R.T. goals from clinician notes",
    long_about = "Goalsmith runs a goal-generation agent and an evaluation agent over clinician notes.\nEach run prints its artifact, or the reason it failed, as JSON."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (overrides GOALSMITH_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on one note
    ///
    /// NOTE is a path to a `.json` or text note file, or a note reference the
    /// `fetch_note` tool can resolve.
    Run {
        /// Note file or reference
        note: String,

        #[command(flatten)]
        run: commands::RunOptions,
    },

    /// Run the pipeline on every `.json` and `.txt` note in a directory
    Batch {
        /// Directory holding note files
        dir: PathBuf,

        #[command(flatten)]
        run: commands::RunOptions,
    },

    /// List registered tools and which agents may call them
    Tools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and show the resolved agent setup
    CheckConfig,
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let level = parse_level(&args.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Logs go to stderr; stdout carries the JSON outcome.
    if args.log_json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = commands::load_config(args.config.as_deref())?;

    let succeeded = match args.command {
        Command::Run { note, run } => commands::run::execute(config, &note, &run).await?,
        Command::Batch { dir, run } => commands::batch::execute(config, &dir, &run).await?,
        Command::Tools { json } => commands::tools::execute(&config, json)?,
        Command::CheckConfig => commands::check_config::execute(&config),
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
