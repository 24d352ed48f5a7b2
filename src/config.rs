//! Cache configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (or an explicit file)
//! 3. `ORIGIN_CACHE_*` environment variables
//! 4. Command-line flags, applied by the caller after loading

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{DEFAULT_OP_TIMEOUT, DEFAULT_SCAN_TIMEOUT};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "ORIGIN_CACHE_";

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the backing file. Defaults to the platform cache dir.
    pub dir: Option<PathBuf>,

    /// Budget for single-row operations, in milliseconds.
    pub op_timeout_ms: u64,

    /// Budget for full-table scans, in milliseconds.
    pub scan_timeout_ms: u64,

    /// Rows fetched per batch by full-table reads.
    pub batch_size: usize,

    /// How long SQLite waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Read-only connections kept open between reads.
    pub max_idle_readers: usize,

    /// Remove and recreate a backing file that is not a valid database.
    pub recreate_if_corrupt: bool,

    /// Emit a trace record for every statement.
    pub trace: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            op_timeout_ms: DEFAULT_OP_TIMEOUT.as_millis() as u64,
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT.as_millis() as u64,
            batch_size: 1_000,
            busy_timeout_ms: 5_000,
            max_idle_readers: 4,
            recreate_if_corrupt: false,
            trace: true,
        }
    }
}

impl CacheConfig {
    /// Load from the default config file and the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Ok(path) => Self::load_from(Some(&path)),
            Err(e) => {
                log::debug!("No config directory ({}), using defaults and environment", e);
                Self::load_from(None)
            }
        }
    }

    /// Load from `file` (if given and present) and the environment.
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            if path.exists() {
                log::debug!("Loading config from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .context("Failed to load cache configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.op_timeout_ms == 0 || self.scan_timeout_ms == 0 {
            anyhow::bail!("operation timeouts must be greater than zero");
        }
        Ok(())
    }

    /// Save to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// The directory holding the backing file.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        Ok(Self::project_dirs()?.cache_dir().to_path_buf())
    }

    /// Default platform-specific configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "origincache", "origin-cache")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
    }

    /// Budget for single-row operations.
    #[must_use]
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Budget for full-table scans.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// SQLite busy timeout.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
