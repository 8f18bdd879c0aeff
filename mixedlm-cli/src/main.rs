//! mixedlm: fit linear mixed-effects models from the command line.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mixedlm",
    version,
    about = "Fit linear mixed-effects models by profiled maximum likelihood or REML",
    long_about = "Fits linear mixed-effects models with one scalar, one vector-valued, or several\n\
                   scalar random-effects terms, reading pre-built design matrices from JSON."
)]
struct Cli {
    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model from a JSON construction file and save the summary
    Fit(commands::fit::FitArgs),

    /// Print a saved fit summary as JSON
    Show(commands::show::ShowArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    tracing::info!("mixedlm v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Show(args) => commands::show::run(args),
    }
}
