//! Store and application configuration.
//!
//! # Responsibility
//! - Map store names onto database files under one root directory.
//! - Load application configuration from JSON.
//!
//! # Invariants
//! - Only names matching [`STORE_NAME_PATTERN`] are mapped to paths, so a
//!   name can never escape `root_dir`.

use crate::logging::LoggingConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accepted store names.
pub const STORE_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$";

const DB_FILE_EXTENSION: &str = "sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

static STORE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(STORE_NAME_PATTERN).expect("valid store name regex"));

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidStoreName(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "invalid configuration: {err}"),
            Self::InvalidStoreName(name) => write!(
                f,
                "store name `{name}` is invalid; expected {STORE_NAME_PATTERN}"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidStoreName(_) => None,
        }
    }
}

/// Where store databases live and how connections are tuned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<name>.sqlite3` file per store.
    pub root_dir: PathBuf,
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns the database file backing `name`.
    pub fn db_path(&self, name: &str) -> Result<PathBuf, ConfigError> {
        validate_store_name(name)?;
        Ok(self.root_dir.join(format!("{name}.{DB_FILE_EXTENSION}")))
    }

    /// Returns the database file and the SQLite side files for `name`.
    pub(crate) fn db_files(&self, name: &str) -> Result<Vec<PathBuf>, ConfigError> {
        let main = self.db_path(name)?;
        let mut files = vec![main.clone()];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut side = main.clone().into_os_string();
            side.push(suffix);
            files.push(PathBuf::from(side));
        }
        Ok(files)
    }
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&text)
    }
}

pub fn validate_store_name(name: &str) -> Result<(), ConfigError> {
    if STORE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidStoreName(name.to_string()))
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
