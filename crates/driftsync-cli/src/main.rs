//! driftsync CLI - command-line front-end for the sync core
//!
//! Provides commands for:
//! - Running a one-shot sync
//! - Running the engine in the foreground until interrupted
//! - Viewing sync status, statistics and transaction history
//! - Inspecting and validating configuration
//!
//! Exit codes: 0 on success, non-zero on any fatal error. Invalid
//! configuration fails before any store or provider is constructed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod setup;

use commands::{
    config::ConfigCommand, history::HistoryCommand, start::StartCommand, status::StatusCommand,
    sync::SyncCommand,
};
use driftsync_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "driftsync", version, about = "Continuous directory-to-object-store sync")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an alternate configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a single synchronization cycle
    Sync(SyncCommand),
    /// Run the engine in the foreground until interrupted
    Start(StartCommand),
    /// Show synchronization status and statistics
    Status(StatusCommand),
    /// List recent sync transactions
    History(HistoryCommand),
    /// Inspect or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_tracing(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("driftsync={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::load_layered(cli.config.as_deref());
    init_tracing(cli.verbose, &config);

    let result = match &cli.command {
        Commands::Sync(cmd) => cmd.run(&config, cli.json).await,
        Commands::Start(cmd) => cmd.run(&config).await,
        Commands::Status(cmd) => cmd.run(&config, cli.json).await,
        Commands::History(cmd) => cmd.run(&config, cli.json).await,
        Commands::Config(cmd) => cmd.run(&config, cli.config.as_deref(), cli.json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
