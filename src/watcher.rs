//! Upload directory watcher
//!
//! Uses the `notify` crate to pick up symbol packages as they land in the
//! upload directory and submit them for indexing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │   notify    │────>│  debouncer  │────>│  UploadTarget    │
//! │   watcher   │     │  (500ms)    │     │ (PackageProcessor)│
//! └─────────────┘     └─────────────┘     └──────────────────┘
//! ```
//!
//! Packages already present when the watcher starts are submitted first.
//! The directory is watched non-recursively.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::config::WatcherConfig;
use crate::error::{Result, SymbolIndexError};
use crate::processor::PackageProcessor;

/// Receives packages discovered by the watcher
pub trait UploadTarget: Send + Sync {
    fn submit(&self, package: &Path) -> Result<()>;
}

impl UploadTarget for PackageProcessor {
    fn submit(&self, package: &Path) -> Result<()> {
        self.enqueue(package)
    }
}

/// Watches an upload directory for new symbol packages
pub struct UploadWatcher {
    upload_dir: PathBuf,
    config: WatcherConfig,
    running: Arc<AtomicBool>,
}

impl UploadWatcher {
    pub fn new(upload_dir: PathBuf, config: WatcherConfig) -> Self {
        Self {
            upload_dir,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether `path` names a package this watcher picks up
    pub fn matches(&self, path: &Path) -> bool {
        matches_pattern(path, &self.config.pattern)
    }

    /// Matching packages currently in the upload directory, sorted
    pub fn existing_packages(&self) -> Result<Vec<PathBuf>> {
        let entries =
            fs::read_dir(&self.upload_dir).map_err(|e| SymbolIndexError::io(&self.upload_dir, e))?;
        let mut packages: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.matches(path))
            .collect();
        packages.sort();
        Ok(packages)
    }

    /// Submit existing packages, then watch for new ones.
    ///
    /// The returned handle stops the watcher when dropped.
    pub fn start(&self, target: Arc<dyn UploadTarget>) -> Result<WatcherHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(WatcherHandle {
                running: Arc::clone(&self.running),
            });
        }

        let backlog = self.existing_packages()?;
        if !backlog.is_empty() {
            tracing::info!("[WATCHER] Submitting {} existing package(s)", backlog.len());
        }
        for package in &backlog {
            if let Err(e) = target.submit(package) {
                tracing::error!("[WATCHER] Failed to submit {}: {}", package.display(), e);
            }
        }

        let (tx, rx) = mpsc::channel();
        let watch_error = |e: notify::Error| SymbolIndexError::IoError {
            path: self.upload_dir.clone(),
            message: format!("failed to watch: {}", e),
        };
        let mut debouncer = new_debouncer(self.config.debounce_duration(), tx).map_err(watch_error)?;
        debouncer
            .watcher()
            .watch(&self.upload_dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;
        tracing::info!("[WATCHER] Watching {}", self.upload_dir.display());

        let running = Arc::clone(&self.running);
        let cooldown = self.config.cooldown();
        let pattern = self.config.pattern.clone();

        std::thread::spawn(move || {
            let mut recently_submitted: HashMap<PathBuf, Instant> = HashMap::new();
            let now = Instant::now();
            for package in backlog {
                recently_submitted.insert(package, now);
            }

            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                recently_submitted.retain(|_, at| now.duration_since(*at) < cooldown.saturating_mul(2));

                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(Ok(events)) => {
                        tracing::debug!("[WATCHER] Received {} raw events", events.len());
                        let now = Instant::now();
                        for event in events {
                            if !matches!(event.kind, DebouncedEventKind::Any) {
                                continue;
                            }
                            let path = event.path;
                            if !path.is_file() || !matches_pattern(&path, &pattern) {
                                tracing::trace!("[WATCHER] Filtered out: {:?}", path);
                                continue;
                            }
                            if recently_submitted
                                .get(&path)
                                .is_some_and(|at| now.duration_since(*at) < cooldown)
                            {
                                tracing::debug!("[WATCHER] Skipping {:?} (in cooldown)", path);
                                continue;
                            }

                            recently_submitted.insert(path.clone(), now);
                            tracing::info!("[WATCHER] New package {}", path.display());
                            if let Err(e) = target.submit(&path) {
                                tracing::error!("[WATCHER] Failed to submit {}: {}", path.display(), e);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::error!("[WATCHER] Watch error: {:?}", e);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            // Keep debouncer alive until the thread exits
            drop(debouncer);
            tracing::debug!("[WATCHER] Stopped");
        });

        Ok(WatcherHandle {
            running: Arc::clone(&self.running),
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn matches_pattern(path: &Path, pattern: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(&pattern))
}

/// Handle for controlling a running watcher
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
