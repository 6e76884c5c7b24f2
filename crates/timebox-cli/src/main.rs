//! timebox CLI: take and review timed assessments from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "timebox", version, about = "Timed assessment attempt engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session, apply answers from a file and optionally submit
    Take {
        /// Session id issued by the assessment backend
        #[arg(long)]
        session: String,

        /// TOML file with `[[answers]]` entries
        #[arg(long)]
        answers: PathBuf,

        /// Submit the attempt after applying the answers
        #[arg(long)]
        confirm: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the scored review of a submitted session
    Review {
        /// Session id issued by the assessment backend
        #[arg(long)]
        session: String,

        /// Which questions to show: all, correct, incorrect
        #[arg(long, default_value = "all")]
        filter: String,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config and an example answers file
    Init,
}

#[tokio::main]
async fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "timebox=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            session,
            answers,
            confirm,
            config,
        } => commands::take::execute(session, answers, confirm, config).await,
        Commands::Review {
            session,
            filter,
            format,
            config,
        } => commands::review::execute(session, filter, format, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
