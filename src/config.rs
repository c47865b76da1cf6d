//! Row store configuration.
//!
//! Settings load from a TOML file; every key is optional and falls back to
//! the defaults below.
//!
//! ```toml
//! path = "/var/lib/graph/entities.db"
//! journal_mode = "wal"
//! synchronous = "normal"
//! busy_timeout_ms = 6000
//! automatic_index = false
//! page_size = 65536
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// SQLite `journal_mode` pragma values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Write-ahead log.
    #[default]
    Wal,
    /// Journal kept in memory.
    Memory,
    /// No journal.
    Off,
}

impl JournalMode {
    /// Pragma argument.
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
            JournalMode::Off => "OFF",
        }
    }
}

/// SQLite `synchronous` pragma values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynchronousMode {
    /// Sync on every commit.
    Full,
    /// Sync at checkpoints only (safe with WAL).
    #[default]
    Normal,
    /// Never sync.
    Off,
}

impl SynchronousMode {
    /// Pragma argument.
    pub fn as_str(self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

/// Options applied when opening a [`crate::SqliteStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Journal mode; ignored for in-memory databases.
    pub journal_mode: JournalMode,
    /// Durability level.
    pub synchronous: SynchronousMode,
    /// Milliseconds to wait on a locked database.
    pub busy_timeout_ms: u64,
    /// Keep temporary tables and indices in memory.
    pub temp_store_memory: bool,
    /// Bytes of the file to memory-map; zero disables mmap.
    pub mmap_size: u64,
    /// Upper bound in bytes for a retained journal or WAL file.
    pub journal_size_limit: i64,
    /// Enforce foreign keys.
    pub foreign_keys: bool,
    /// Let the planner build transient indexes for unindexed lookups.
    pub automatic_index: bool,
    /// Page size in bytes for newly created databases; `None` keeps SQLite's.
    pub page_size: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: JournalMode::default(),
            synchronous: SynchronousMode::default(),
            busy_timeout_ms: 6_000,
            temp_store_memory: true,
            mmap_size: 0,
            journal_size_limit: 6_144_000,
            foreign_keys: false,
            automatic_index: true,
            page_size: None,
        }
    }
}

impl StoreConfig {
    /// Private in-memory database with default pragmas.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed database at `path` with default pragmas.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parses TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| MatchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `explicit` or the default config file, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(explicit: Option<PathBuf>) -> Result<Self> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// `<config dir>/sombra-match/store.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sombra-match").join("store.toml"))
}
