//! CLI entry point for comicdl.

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use comicdl_core::Catalog;
use comicdl_core::Settings;
use comicdl_core::config::CliOverrides;
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{Args, Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Before tracing, so RUST_LOG may come from .env
    let dotenv_path = dotenvy::dotenv().ok();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries JSON results
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    if let Some(path) = &dotenv_path {
        debug!(path = %path.display(), "loaded .env");
    }

    let overrides = CliOverrides {
        download_root: args.download_root.clone(),
        database_path: args.database.clone(),
        concurrency: args.concurrency.map(usize::from),
    };
    let settings =
        Settings::load(args.config.as_deref(), &overrides).context("Failed to load configuration")?;
    debug!(?settings, "settings resolved");

    match args.command {
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            commands::run_config_show_command(args.config.as_deref(), &settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Catalog { command } => {
            let db = commands::open_database(&settings).await?;
            let catalog = Catalog::new(db.clone());
            let result = commands::run_catalog_command(command, &catalog).await;
            db.close().await;
            result.map(|()| ExitCode::SUCCESS)
        }
        Command::Jobs { command } => {
            let db = commands::open_database(&settings).await?;
            info!(
                download_root = %settings.download_root.display(),
                concurrency = settings.concurrency,
                "comicdl starting"
            );
            let show_progress = !args.quiet && std::io::stderr().is_terminal();
            let result =
                commands::run_jobs_command(command, &settings, db.clone(), show_progress).await;
            db.close().await;
            result
        }
    }
}
