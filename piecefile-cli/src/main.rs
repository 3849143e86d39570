//! Piecefile CLI - Command-line interface
//!
//! Assembles files from out-of-order pieces and inspects saved progress.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use piecefile_core::config::PiecefileConfig;
use piecefile_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "piecefile")]
#[command(about = "Out-of-order piece assembly with completion tracking")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log (overrides PIECEFILE_LOG_DIR)
    #[arg(long, global = true, conflicts_with = "no_log_file")]
    log_dir: Option<PathBuf>,

    /// Skip writing the trace log
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PiecefileConfig::from_env();
    if cli.no_log_file {
        config.logging.logs_dir = None;
    } else if let Some(log_dir) = cli.log_dir {
        config.logging.logs_dir = Some(log_dir);
    }

    init_tracing(cli.log_level.as_tracing_level(), &config.logging)
        .context("failed to initialize tracing")?;

    commands::handle_command(cli.command, config).await
}
