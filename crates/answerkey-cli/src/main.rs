//! answerkey CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "answerkey", version, about = "Partial-credit response grader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade submissions against a problem set
    Grade {
        /// Path to .toml problem set or directory
        #[arg(long)]
        problems: PathBuf,

        /// JSON file of submissions keyed by problem id
        #[arg(long)]
        submissions: PathBuf,

        /// Seed for problems that don't declare one
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Directory to write the JSON report to
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate problem set TOML files
    Validate {
        /// Path to problem set file or directory
        #[arg(long)]
        problems: PathBuf,
    },

    /// Show how choices are laid out for a seed
    Preview {
        /// Path to a problem set file
        #[arg(long)]
        problems: PathBuf,

        /// Seed for problems that don't declare one
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Create starter config and example problem set
    Init,
}

#[tokio::main]
async fn main() {
    let filter = match "answerkey=info".parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            problems,
            submissions,
            seed,
            format,
            output,
            config,
        } => commands::grade::execute(problems, submissions, seed, format, output, config).await,
        Commands::Validate { problems } => commands::validate::execute(problems),
        Commands::Preview { problems, seed } => commands::preview::execute(problems, seed),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
