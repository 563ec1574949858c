//! Configuration for the wildcard engine
//!
//! Holds the source directories and the cache budget that decides between
//! full-cache and on-demand catalog loading. Persisted as JSON under
//! `~/.wildprompt/config.json`; every field has a default so a partial or
//! missing config file still produces a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, WildError};

/// Default cache limit in megabytes.
pub const DEFAULT_CACHE_LIMIT_MB: u64 = 50;

/// Configuration for building a [`WildcardCatalog`](crate::WildcardCatalog).
///
/// The primary `wildcard_dir` is always scanned; `custom_wildcard_dir` is an
/// optional secondary root merged into the same namespace (scanned after the
/// primary root, so its keys override on collision).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WildcardConfig {
    /// Primary wildcard source directory.
    pub wildcard_dir: PathBuf,

    /// Optional secondary source directory merged into the same namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_wildcard_dir: Option<PathBuf>,

    /// Aggregate source size budget in megabytes. When the combined size of
    /// all source files reaches this limit, the catalog switches to
    /// on-demand loading of flat files.
    pub cache_limit_mb: u64,
}

impl Default for WildcardConfig {
    fn default() -> Self {
        Self {
            wildcard_dir: default_wildcard_dir(),
            custom_wildcard_dir: None,
            cache_limit_mb: DEFAULT_CACHE_LIMIT_MB,
        }
    }
}

impl WildcardConfig {
    /// Create a config rooted at an explicit directory, keeping defaults
    /// for everything else.
    pub fn with_root(wildcard_dir: impl Into<PathBuf>) -> Self {
        Self {
            wildcard_dir: wildcard_dir.into(),
            ..Self::default()
        }
    }

    /// Cache limit converted to bytes.
    pub fn cache_limit_bytes(&self) -> u64 {
        self.cache_limit_mb * 1024 * 1024
    }

    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the default configuration; a file that exists
    /// but fails to parse is an error (silently ignoring a corrupt config
    /// hides user mistakes).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| WildError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(custom) = &config.custom_wildcard_dir {
            if !custom.exists() {
                warn!(path = %custom.display(), "custom wildcard directory not found");
            }
        }

        Ok(config)
    }

    /// Load from the default config path (`~/.wildprompt/config.json`).
    pub fn load_default() -> Result<Self> {
        Self::load(&default_config_path())
    }

    /// Persist configuration as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    home_base().join("config.json")
}

/// Default primary wildcard directory.
fn default_wildcard_dir() -> PathBuf {
    home_base().join("wildcards")
}

fn home_base() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wildprompt")
}
