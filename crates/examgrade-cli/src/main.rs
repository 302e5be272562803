//! examgrade CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "examgrade",
    version,
    about = "Concurrent batch scoring for admission exam answer sheets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every pending attempt in a fixture
    Evaluate {
        /// Path to .toml fixture or directory
        #[arg(long)]
        fixture: PathBuf,

        /// Number of workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,

        /// Output directory (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Reject the batch if any attempt is not pending
        #[arg(long)]
        strict: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate fixture TOML files
    Validate {
        /// Path to fixture file or directory
        #[arg(long)]
        fixture: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rank results from a saved report
    Ranking {
        /// Report JSON written by `evaluate`
        #[arg(long)]
        report: PathBuf,

        /// Restrict to one exam
        #[arg(long)]
        exam: Option<String>,

        /// Number of rows to show
        #[arg(long, default_value = "10")]
        top: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create starter config and example fixture
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examgrade=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            fixture,
            workers,
            output,
            strict,
            config,
        } => commands::evaluate::execute(fixture, workers, output, strict, config).await,
        Commands::Validate { fixture, config } => commands::validate::execute(fixture, config),
        Commands::Ranking {
            report,
            exam,
            top,
            json,
        } => commands::ranking::execute(report, exam, top, json),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
