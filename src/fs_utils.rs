//! Filesystem helpers shared by the worker and the processor
//!
//! - `move_file`: Moves a package without ever overwriting the destination
//! - `purge_directory`: Best-effort emptying of a publication store
//! - `remove_dir_logged`: Best-effort recursive delete that only logs failures
//! - `unique_dir`: Fresh uuid-named directory path under a parent
//! - `get_data_base_dir` / `get_config_file`: Platform-appropriate defaults

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "symbol-indexer";

/// Move `src` to `dst`, refusing to replace an existing destination.
///
/// Falls back to copy + delete when the rename crosses a filesystem
/// boundary (the upload share and the archive often live on different
/// volumes).
///
/// # Errors
///
/// - `AlreadyExists` if `dst` exists
/// - Any error from the rename, copy, or removal of the source
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Delete a directory tree, logging instead of failing.
///
/// A directory that does not exist counts as removed.
pub fn remove_dir_logged(path: &Path, what: &str) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to delete {} at {}: {}", what, path.display(), e);
            false
        }
    }
}

/// Empty a directory: every subdirectory, and the top-level files too when
/// `include_files` is set. Individual failures are skipped.
///
/// Returns the number of entries that could not be removed.
pub fn purge_directory(path: &Path, include_files: bool) -> usize {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
            }
            return 0;
        }
    };

    let mut failures = 0;
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        let result = if is_dir {
            fs::remove_dir_all(&entry_path)
        } else if include_files {
            fs::remove_file(&entry_path)
        } else {
            continue;
        };

        if let Err(e) = result {
            tracing::debug!("Could not purge {}: {}", entry_path.display(), e);
            failures += 1;
        }
    }
    failures
}

/// A path under `parent` named by a fresh uuid. Nothing is created on disk.
pub fn unique_dir(parent: &Path) -> PathBuf {
    parent.join(uuid::Uuid::new_v4().to_string())
}

/// Get the platform-appropriate base directory for package storage.
///
/// - **Windows**: `%LOCALAPPDATA%\symbol-indexer`
/// - **Unix**: `$XDG_DATA_HOME/symbol-indexer` or `~/.local/share/symbol-indexer`
/// - **Fallback**: System temp directory + `symbol-indexer`
pub fn get_data_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Default configuration file location.
///
/// - **Windows**: `%APPDATA%\symbol-indexer\config.toml`
/// - **Unix**: `$XDG_CONFIG_HOME/symbol-indexer/config.toml` or `~/.config/...`
pub fn get_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("config.toml")
}

/// Default root for unpack directories and validation sandboxes
pub fn get_temp_base_dir() -> PathBuf {
    std::env::temp_dir().join(APP_DIR)
}
