//! CLI command handlers.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod catalog;
mod config;
mod jobs;
mod progress;

pub use catalog::run_catalog_command;
pub use config::run_config_show_command;
pub use jobs::run_jobs_command;

use std::io::Write;

use anyhow::{Context, Result};
use comicdl_core::{Database, Settings};
use serde::Serialize;
use tracing::debug;

/// Opens the configured database, creating its parent directory if needed.
pub async fn open_database(settings: &Settings) -> Result<Database> {
    if let Some(parent) = settings.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory '{}'", parent.display())
        })?;
    }

    debug!(path = %settings.database_path.display(), "opening database");
    Database::new_with_options(&settings.database_path, settings.database_options())
        .await
        .with_context(|| {
            format!(
                "Failed to open database '{}'",
                settings.database_path.display()
            )
        })
}

/// Writes `value` to stdout as pretty JSON.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("Failed to write to stdout")?;
    Ok(())
}
