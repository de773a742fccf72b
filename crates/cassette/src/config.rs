//! Store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `CASSETTE_BACKEND`: `file` (default) or `memory`
//! - `CASSETTE_ROOT`: Root directory for the file backend
//! - `CASSETTE_ATOMIC_MOVE`: Set to "false" to publish by copying instead of renaming
//! - `CASSETTE_CACHE_NAME`: Identity of the memory backend
//!
//! Default root: `~/.cassette/store`

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::staging::STAGING_DIR;

/// Which store realization to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Sharded files under `root`.
    #[default]
    File,
    /// Whole payloads in an in-process keyed map.
    Memory,
}

impl FromStr for Backend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "memory" => Ok(Backend::Memory),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown store backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::File => f.write_str("file"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

/// Configuration for a content addressable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassetteConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Root directory. Shards live directly under it, staging files in
    /// `{root}/staging/`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Publish with an atomic no-clobber rename. When false, content is
    /// copied into place, which works on filesystems without atomic rename
    /// but lets readers observe a file before it is complete.
    #[serde(default = "default_true")]
    pub atomic_move: bool,

    /// Identity of the memory backend.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
}

fn default_true() -> bool {
    true
}

fn default_cache_name() -> String {
    "cassette".to_string()
}

/// Get the default store root (~/.cassette/store).
fn default_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".cassette").join("store"))
        .unwrap_or_else(|| PathBuf::from(".cassette/store"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Default for CassetteConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            root: default_root(),
            atomic_move: true,
            cache_name: default_cache_name(),
        }
    }
}

impl CassetteConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("CASSETTE_BACKEND") {
            config.backend = backend
                .parse()
                .context("invalid CASSETTE_BACKEND")?;
        }

        if let Ok(root) = env::var("CASSETTE_ROOT") {
            config.root = PathBuf::from(root);
        }

        if let Ok(value) = env::var("CASSETTE_ATOMIC_MOVE") {
            config.atomic_move = parse_bool(&value)
                .with_context(|| format!("invalid CASSETTE_ATOMIC_MOVE: {}", value))?;
        }

        if let Ok(name) = env::var("CASSETTE_CACHE_NAME") {
            config.cache_name = name;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[cassette]` section:
    /// ```toml
    /// [cassette]
    /// backend = "file"
    /// root = "/srv/cassette"
    /// atomic_move = true
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to load config: {}", path.display()))
    }

    /// Parse a TOML document, reading its `[cassette]` section.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table: toml::Table = contents.parse().context("failed to parse TOML")?;

        match table.get("cassette") {
            Some(section) => section
                .clone()
                .try_into()
                .context("failed to parse [cassette] section"),
            None => Self::from_env(),
        }
    }

    /// File-backed config rooted at `path`.
    pub fn with_root(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            ..Self::default()
        }
    }

    /// Memory-backed config with the given cache name.
    pub fn memory(cache_name: impl Into<String>) -> Self {
        Self {
            backend: Backend::Memory,
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    /// Where in-progress writes are staged.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Check the values the selected backend requires.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.backend {
            Backend::File if self.root.as_os_str().is_empty() => Err(
                StoreError::InvalidArgument("store root path must not be empty".to_string()),
            ),
            Backend::Memory if self.cache_name.trim().is_empty() => Err(
                StoreError::InvalidArgument("cache name must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
