//! CLI tool for DepthPro config validation, summarization, and preprocessing.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "depth-pro")]
#[command(author, version, about = "DepthPro CLI for validation, summarization, and preprocessing")]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a DepthPro configuration file
    Validate {
        /// Path to the JSON or YAML configuration file
        config: PathBuf,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Summarize a DepthPro model from its configuration
    Summarize {
        /// Path to the JSON or YAML configuration file
        config: PathBuf,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Preprocess images into a pixel_values batch and report its statistics
    Preprocess(commands::preprocess::PreprocessArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { config, format } => commands::validate::run(&config, &format),
        Commands::Summarize { config, format } => commands::summarize::run(&config, &format),
        Commands::Preprocess(args) => commands::preprocess::run(&args),
    }
}
