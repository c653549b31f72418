//! symbol-indexer configuration management.
//!
//! Handles the configuration file at:
//! - Linux: ~/.config/symbol-indexer/config.toml
//! - macOS: ~/Library/Application Support/symbol-indexer/config.toml
//! - Windows: %APPDATA%\symbol-indexer\config.toml
//!
//! A missing file yields defaults rooted at the platform data directory.
//! Every key is optional except `source_server_url`, which `validate`
//! requires before anything is indexed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::StoreConfig;
use crate::error::{Result, SymbolIndexError};
use crate::fs_utils;
use crate::indexer::WorkerConfig;

/// Full processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Directory packages are uploaded into
    pub upload_dir: PathBuf,

    /// Archive of successfully indexed packages
    pub processed_packages_dir: PathBuf,

    /// Source store the source index points at
    pub processed_sources_dir: PathBuf,

    /// Symbol store PDBs are published to
    pub processed_symbols_dir: PathBuf,

    /// Root for unpack directories and validation sandboxes
    pub temp_dir: PathBuf,

    /// Location of the Debugging Tools for Windows
    pub debugging_tools_dir: PathBuf,

    /// Base URL debuggers use to fetch indexed sources
    pub source_server_url: String,

    /// Locked-file retry policy
    pub retry: RetryPolicy,

    /// Batch timeouts
    pub timeouts: TimeoutConfig,

    /// Upload directory watching
    pub watcher: WatcherConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let base = fs_utils::get_data_base_dir();
        Self {
            upload_dir: base.join("upload"),
            processed_packages_dir: base.join("processed").join("packages"),
            processed_sources_dir: base.join("processed").join("sources"),
            processed_symbols_dir: base.join("processed").join("symbols"),
            temp_dir: fs_utils::get_temp_base_dir(),
            debugging_tools_dir: default_debugging_tools_dir(),
            source_server_url: String::new(),
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(windows)]
fn default_debugging_tools_dir() -> PathBuf {
    let arch = if cfg!(target_pointer_width = "64") {
        "x64"
    } else {
        "x86"
    };
    PathBuf::from(r"C:\Program Files (x86)\Windows Kits\10\Debuggers").join(arch)
}

#[cfg(not(windows))]
fn default_debugging_tools_dir() -> PathBuf {
    fs_utils::get_data_base_dir().join("debuggers")
}

/// How the worker treats packages it cannot open exclusively
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Passes through the locked-retry queue before a package is dropped
    pub maximum_attempts: u32,
    /// Waits per pass before a package goes (back) to the locked-retry queue
    pub maximum_lock_wait_attempts: u32,
    /// Sleep between probes of a locked package, in milliseconds
    pub lock_wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            maximum_lock_wait_attempts: 3,
            lock_wait_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

/// How long batch calls wait for their reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// `index` and `rebuild_index`, in seconds
    pub index_secs: u64,
    /// `is_valid`, in seconds
    pub validate_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            index_secs: 60,
            validate_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn index(&self) -> Duration {
        Duration::from_secs(self.index_secs)
    }

    pub fn validate(&self) -> Duration {
        Duration::from_secs(self.validate_secs)
    }
}

/// Upload watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
    /// File name suffix of packages to pick up
    pub pattern: String,
    /// Seconds during which a path that was just queued is not queued again
    pub cooldown_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            pattern: ".symbols.nupkg".to_string(),
            cooldown_secs: 3,
        }
    }
}

impl WatcherConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&fs_utils::get_config_file())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SymbolIndexError::io(path, e))?;

        toml::from_str(&content).map_err(|e| SymbolIndexError::ConfigError {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Configuration with every directory under `root`
    pub fn with_root(root: &Path, source_server_url: impl Into<String>) -> Self {
        Self {
            upload_dir: root.join("upload"),
            processed_packages_dir: root.join("processed").join("packages"),
            processed_sources_dir: root.join("processed").join("sources"),
            processed_symbols_dir: root.join("processed").join("symbols"),
            temp_dir: root.join("temp"),
            debugging_tools_dir: root.join("debuggers"),
            source_server_url: source_server_url.into(),
            ..Self::default()
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source_server_url.trim().is_empty() {
            return Err(SymbolIndexError::ConfigError {
                message: "source_server_url must be set".to_string(),
            });
        }
        if self.timeouts.index_secs == 0 || self.timeouts.validate_secs == 0 {
            return Err(SymbolIndexError::ConfigError {
                message: "timeouts must be greater than zero".to_string(),
            });
        }
        if self.processed_packages_dir == self.upload_dir {
            return Err(SymbolIndexError::ConfigError {
                message: "processed_packages_dir must differ from upload_dir".to_string(),
            });
        }
        Ok(())
    }

    /// Create the upload, archive and store directories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.upload_dir,
            &self.processed_packages_dir,
            &self.processed_sources_dir,
            &self.processed_symbols_dir,
            &self.temp_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| SymbolIndexError::io(dir, e))?;
        }
        Ok(())
    }

    /// Store locations handed to the indexing backend
    pub fn stores(&self) -> StoreConfig {
        StoreConfig {
            debugging_tools_dir: self.debugging_tools_dir.clone(),
            source_server_url: self.source_server_url.clone(),
            sources_dir: self.processed_sources_dir.clone(),
            symbols_dir: self.processed_symbols_dir.clone(),
        }
    }

    /// Worker configuration for the production pipeline
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            stores: self.stores(),
            processed_packages_dir: self.processed_packages_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Worker configuration for a validation sandbox: same tools and source
    /// server, fresh throwaway archive and stores under the temp root
    pub fn sandbox_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            stores: StoreConfig {
                debugging_tools_dir: self.debugging_tools_dir.clone(),
                source_server_url: self.source_server_url.clone(),
                sources_dir: fs_utils::unique_dir(&self.temp_dir),
                symbols_dir: fs_utils::unique_dir(&self.temp_dir),
            },
            processed_packages_dir: fs_utils::unique_dir(&self.temp_dir),
            temp_dir: self.temp_dir.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SymbolIndexError::ConfigError {
            message: format!("Failed to serialize config: {}", e),
        })
    }
}
