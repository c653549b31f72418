//! Test workspace: a processor configuration rooted in a temp directory

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use symbol_indexer::{IndexingBackend, PackageProcessor, ProcessorConfig, RetryPolicy};

/// Upload, archive, store and temp directories under one `TempDir`
pub struct TestWorkspace {
    dir: TempDir,
    config: ProcessorConfig,
}

impl TestWorkspace {
    /// Workspace with short lock waits and a 10 second batch timeout
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = ProcessorConfig::with_root(dir.path(), "https://sources.example.com");
        config.retry = RetryPolicy {
            maximum_attempts: 2,
            maximum_lock_wait_attempts: 2,
            lock_wait_ms: 20,
        };
        config.timeouts.index_secs = 10;
        config.timeouts.validate_secs = 10;
        config
            .ensure_directories()
            .expect("Failed to create workspace directories");
        Self { dir, config }
    }

    pub fn with_index_timeout(mut self, secs: u64) -> Self {
        self.config.timeouts.index_secs = secs;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Processor over `backend`; not started
    pub fn processor(&self, backend: Arc<dyn IndexingBackend>) -> PackageProcessor {
        PackageProcessor::new(self.config.clone(), backend).expect("Failed to create processor")
    }

    /// Processor over `backend`, already started
    pub fn started_processor(&self, backend: Arc<dyn IndexingBackend>) -> PackageProcessor {
        let processor = self.processor(backend);
        processor.start().expect("Failed to start processor");
        processor
    }

    /// Write a package into the upload directory
    pub fn add_package(&self, file_name: &str) -> PathBuf {
        let path = self.config.upload_dir.join(file_name);
        fs::write(&path, format!("package {}", file_name)).expect("Failed to write package");
        path
    }

    /// Write a package outside every configured directory
    pub fn add_incoming(&self, file_name: &str) -> PathBuf {
        let dir = self.dir.path().join("incoming");
        fs::create_dir_all(&dir).expect("Failed to create incoming dir");
        let path = dir.join(file_name);
        fs::write(&path, format!("package {}", file_name)).expect("Failed to write package");
        path
    }

    /// Write a package straight into the archive
    pub fn add_archived(&self, file_name: &str) -> PathBuf {
        let path = self.config.processed_packages_dir.join(file_name);
        fs::write(&path, format!("package {}", file_name)).expect("Failed to write package");
        path
    }

    pub fn is_archived(&self, file_name: &str) -> bool {
        self.config.processed_packages_dir.join(file_name).exists()
    }

    pub fn is_uploaded(&self, file_name: &str) -> bool {
        self.config.upload_dir.join(file_name).exists()
    }

    /// Every path below `root`, relative and sorted
    pub fn snapshot(root: &Path) -> Vec<PathBuf> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
            let Ok(entries) = fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_path_buf());
                }
                if path.is_dir() {
                    walk(root, &path, out);
                }
            }
        }

        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    /// Snapshot of the production archive and stores
    pub fn production_snapshot(&self) -> Vec<Vec<PathBuf>> {
        [
            &self.config.upload_dir,
            &self.config.processed_packages_dir,
            &self.config.processed_sources_dir,
            &self.config.processed_symbols_dir,
        ]
        .iter()
        .map(|dir| Self::snapshot(dir))
        .collect()
    }

    /// Top-level entries of the temp directory
    pub fn temp_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.config.temp_dir)
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        entries.sort();
        entries
    }
}
