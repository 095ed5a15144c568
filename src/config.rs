//! Runtime settings: defaults, then config file, then environment, then CLI.
//!
//! The config file is TOML:
//!
//! ```toml
//! download_root = "/srv/comics"
//! database_path = "/srv/comics/comicdl.db"
//! concurrency = 8
//! connect_timeout_secs = 30
//! request_timeout_secs = 60
//! db_max_connections = 5
//! db_busy_timeout_ms = 5000
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::db::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS, DatabaseOptions};
use crate::download::{CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, REQUEST_TIMEOUT_SECS};

/// Download root override, kept under its historical name.
pub const ENV_DOWNLOAD_FOLDER: &str = "DOWNLOAD_FOLDER";
/// Database path override.
pub const ENV_DATABASE: &str = "COMICDL_DATABASE";
/// Concurrency override.
pub const ENV_CONCURRENCY: &str = "COMICDL_CONCURRENCY";

const DEFAULT_DOWNLOAD_ROOT: &str = "downloads";
const DEFAULT_DATABASE_PATH: &str = "comicdl.db";
const APP_DIR: &str = "comicdl";
const CONFIG_FILE: &str = "config.toml";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for these settings.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value '{value}' for environment variable {var}")]
    Env { var: &'static str, value: String },

    /// A value is outside its allowed range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        expected: &'static str,
    },
}

/// Settings as written in the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub download_root: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub db_max_connections: Option<u32>,
    pub db_busy_timeout_ms: Option<u32>,
}

/// Values given on the command line, applied last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub download_root: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Root of every job's directory tree.
    pub download_root: PathBuf,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Concurrent page fetches per run.
    pub concurrency: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub db_max_connections: u32,
    pub db_busy_timeout_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from(DEFAULT_DOWNLOAD_ROOT),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            db_busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Resolves settings from the config file, the process environment and
    /// `cli`, in increasing priority.
    ///
    /// `config_path` names the file explicitly; it must then exist. Without
    /// it, [`resolve_default_config_path`] is used when that file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// environment value is malformed, or a value is out of range.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => Some(load_file_config(path)?),
            None => match resolve_default_config_path() {
                Some(path) if path.exists() => Some(load_file_config(&path)?),
                _ => None,
            },
        };

        let mut settings = Self::default();
        if let Some(file) = &file {
            settings.apply_file(file);
        }
        settings.apply_env(|name| env::var(name).ok())?;
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Overlays the keys present in `file`.
    pub fn apply_file(&mut self, file: &FileConfig) {
        if let Some(root) = &file.download_root {
            self.download_root.clone_from(root);
        }
        if let Some(path) = &file.database_path {
            self.database_path.clone_from(path);
        }
        if let Some(value) = file.concurrency {
            self.concurrency = value;
        }
        if let Some(value) = file.connect_timeout_secs {
            self.connect_timeout_secs = value;
        }
        if let Some(value) = file.request_timeout_secs {
            self.request_timeout_secs = value;
        }
        if let Some(value) = file.db_max_connections {
            self.db_max_connections = value;
        }
        if let Some(value) = file.db_busy_timeout_ms {
            self.db_busy_timeout_ms = value;
        }
    }

    /// Overlays environment variables, read through `lookup`. Empty values
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when `COMICDL_CONCURRENCY` is not a number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(root) = non_empty(ENV_DOWNLOAD_FOLDER) {
            self.download_root = PathBuf::from(root);
        }
        if let Some(path) = non_empty(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = non_empty(ENV_CONCURRENCY) {
            self.concurrency = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_CONCURRENCY,
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    /// Overlays command-line values.
    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(root) = &cli.download_root {
            self.download_root.clone_from(root);
        }
        if let Some(path) = &cli.database_path {
            self.database_path.clone_from(path);
        }
        if let Some(value) = cli.concurrency {
            self.concurrency = value;
        }
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "concurrency",
            u64::try_from(self.concurrency).unwrap_or(u64::MAX),
            1..=100,
            "1..=100",
        )?;
        check_range(
            "connect_timeout_secs",
            self.connect_timeout_secs,
            1..=3600,
            "1..=3600",
        )?;
        check_range(
            "request_timeout_secs",
            self.request_timeout_secs,
            1..=3600,
            "1..=3600",
        )?;
        check_range(
            "db_max_connections",
            u64::from(self.db_max_connections),
            1..=20,
            "1..=20",
        )?;
        check_range(
            "db_busy_timeout_ms",
            u64::from(self.db_busy_timeout_ms),
            0..=120_000,
            "0..=120000",
        )?;
        Ok(())
    }

    /// Connection pool options derived from these settings.
    #[must_use]
    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.db_max_connections,
            busy_timeout_ms: self.db_busy_timeout_ms,
        }
    }
}

fn check_range(
    field: &'static str,
    value: u64,
    range: std::ops::RangeInclusive<u64>,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/comicdl/config.toml`
/// 2. `$HOME/.config/comicdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_DIR)
                .join(CONFIG_FILE),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Reads and parses a config file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}
