// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # autoreel CLI
//!
//! The `autoreel` binary hosts the content orchestrator in-process.
//!
//! ## Commands
//!
//! - `autoreel run --dry-run` - Run every tenant's cycles until Ctrl-C
//! - `autoreel config show|validate|generate` - Configuration management
//! - `autoreel slots --brand B` - Print upcoming publish slots
//! - `autoreel diagnose` - One diagnostics pass against a fresh tenant

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use autoreel_cli::commands::{self, ConfigCommand, DiagnoseArgs, RunArgs, SlotsArgs};

/// autoreel - Autonomous short-form content orchestrator
#[derive(Parser)]
#[command(name = "autoreel")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AUTOREEL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AUTOREEL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "AUTOREEL_LOG_FORMAT",
        value_enum,
        default_value = "compact"
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator until interrupted
    #[command(name = "run")]
    Run(RunArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Print upcoming publish slots for a brand
    #[command(name = "slots")]
    Slots(SlotsArgs),

    /// Run one diagnostics pass and print the report
    #[command(name = "diagnose")]
    Diagnose(DiagnoseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Slots(args)) => commands::slots::execute(args, cli.config).await,
        Some(Commands::Diagnose(args)) => commands::diagnose::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init(),
    }

    Ok(())
}
