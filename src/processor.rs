//! Package processor: the synchronous facade over the indexing pipeline
//!
//! Callers hand in batches of package paths and block until every package
//! has a report or the batch deadline passes. The processor owns the
//! production queue+worker pair and builds throwaway pairs for validation.
//!
//! ```text
//!                 ┌──────────── production pair ────────────┐
//! index ────────► │ WorkQueue ──► IndexerWorker ──► stores   │
//! rebuild_index ► │                                          │
//!                 └──────────────────────────────────────────┘
//!                 ┌──────────── validation pair ────────────┐
//! is_valid ─────► │ WorkQueue ──► IndexerWorker ──► temp/<uuid>
//!                 └──────────────────────────────────────────┘
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::IndexingBackend;
use crate::config::ProcessorConfig;
use crate::correlation::{self, ReportBatch};
use crate::error::{Result, SymbolIndexError};
use crate::fs_utils;
use crate::indexer::{IndexerWorker, WorkerConfig, WorkerStatus};
use crate::package;
use crate::queue::WorkQueue;
use crate::report::{IndexReport, PackageIdentity};

/// Message for batch entries that carry no path
pub const EMPTY_PATH_MESSAGE: &str = "No symbol package path provided";

/// A work queue together with the worker draining it
pub struct IndexingPipeline {
    queue: Arc<WorkQueue>,
    worker: IndexerWorker,
}

impl IndexingPipeline {
    /// Build a stopped pipeline for `config`
    pub fn build(config: WorkerConfig, backend: Arc<dyn IndexingBackend>) -> Result<Self> {
        let queue = WorkQueue::shared();
        let worker = IndexerWorker::new(queue.clone(), backend, config)?;
        Ok(Self { queue, worker })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn worker(&self) -> &IndexerWorker {
        &self.worker
    }
}

/// Result of a validation run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    /// True when at least one package was submitted and all of them indexed
    pub is_valid: bool,
    pub reports: Vec<IndexReport>,
}

/// Synchronous entry point for indexing, validating and rebuilding
pub struct PackageProcessor {
    config: ProcessorConfig,
    backend: Arc<dyn IndexingBackend>,
    production: Mutex<Option<Arc<IndexingPipeline>>>,
}

impl PackageProcessor {
    /// Create a processor. Nothing is built until [`start`](Self::start).
    pub fn new(config: ProcessorConfig, backend: Arc<dyn IndexingBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            production: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Build the production pair if it does not exist yet
    pub fn ensure_indexing_instances(&self) -> Result<Arc<IndexingPipeline>> {
        let mut production = self.production.lock();
        if let Some(pipeline) = production.as_ref() {
            return Ok(pipeline.clone());
        }

        let pipeline = Arc::new(IndexingPipeline::build(
            self.config.worker_config(),
            self.backend.clone(),
        )?);
        tracing::debug!(
            "Built production pipeline (unpack root {})",
            pipeline.worker.unpack_root().display()
        );
        *production = Some(pipeline.clone());
        Ok(pipeline)
    }

    fn production(&self) -> Result<Arc<IndexingPipeline>> {
        self.production
            .lock()
            .clone()
            .ok_or_else(|| SymbolIndexError::InvalidOperation {
                message: "the processor has not been started".to_string(),
            })
    }

    fn identify(&self, path: &Path) -> PackageIdentity {
        package::identify(self.backend.as_ref(), path)
    }

    fn submit(&self, queue: &WorkQueue, paths: &[PathBuf]) -> Result<ReportBatch> {
        let mut batch = ReportBatch::new();
        for path in paths {
            if path.as_os_str().is_empty() {
                batch.push_ready(
                    path,
                    IndexReport::failed(&PackageIdentity::unknown(), EMPTY_PATH_MESSAGE),
                );
                continue;
            }
            let sink = batch.track(path);
            queue.enqueue(path, Some(sink))?;
        }
        Ok(batch)
    }

    /// Index `paths` into the production stores.
    ///
    /// Returns one report per path, in order. Packages without a report by
    /// the index timeout are reported as failed.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the processor has not been started.
    pub fn index(&self, paths: &[PathBuf]) -> Result<Vec<IndexReport>> {
        let pipeline = self.production()?;
        tracing::info!("Indexing {} package(s)", paths.len());

        let batch = self.submit(&pipeline.queue, paths)?;
        Ok(batch.wait_all(self.config.timeouts.index(), |path| self.identify(path)))
    }

    /// Run `paths` through a disposable pipeline without publishing anything.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the processor has not been started, or an I/O
    /// error if the sandbox pipeline cannot be created.
    pub fn is_valid(&self, paths: &[PathBuf]) -> Result<ValidationOutcome> {
        self.production()?;

        let config = self.config.sandbox_worker_config();
        let sandbox_dirs = [
            config.processed_packages_dir.clone(),
            config.stores.sources_dir.clone(),
            config.stores.symbols_dir.clone(),
        ];
        tracing::info!("Validating {} package(s)", paths.len());

        let outcome = self.validate_in_sandbox(config, paths);
        for dir in &sandbox_dirs {
            fs_utils::remove_dir_logged(dir, "validation directory");
        }
        outcome
    }

    fn validate_in_sandbox(&self, config: WorkerConfig, paths: &[PathBuf]) -> Result<ValidationOutcome> {
        let timeout = self.config.timeouts.validate();
        let deadline = correlation::deadline_after(timeout);

        let pipeline = IndexingPipeline::build(config, self.backend.clone())?;
        pipeline.worker.start();
        let batch = self.submit(&pipeline.queue, paths)?;

        // Once the drain finished, anything still pending was dropped by the
        // worker and will never report.
        let drained = pipeline.worker.stop(true).wait_timeout(timeout);
        let remaining = match (drained, deadline) {
            (true, _) => Duration::ZERO,
            (false, Some(deadline)) => deadline.saturating_duration_since(Instant::now()),
            (false, None) => timeout,
        };
        let reports = batch.wait_all(remaining, |path| self.identify(path));
        drop(pipeline);

        let is_valid = !reports.is_empty() && reports.iter().all(IndexReport::is_success);
        Ok(ValidationOutcome { is_valid, reports })
    }

    /// Move every archived package back to the upload directory, purge the
    /// stores and index everything again.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the processor has not been started; I/O errors
    /// reading the archive or creating the upload directory.
    pub fn rebuild_index(&self) -> Result<Vec<IndexReport>> {
        let pipeline = self.production()?;
        tracing::info!("Rebuilding the symbol index");
        pipeline.worker.stop(false).wait();

        let upload_dir = &self.config.upload_dir;
        fs::create_dir_all(upload_dir).map_err(|e| SymbolIndexError::io(upload_dir, e))?;

        let mut batch = ReportBatch::new();
        for archived in self.archived_packages()? {
            let Some(file_name) = archived.file_name() else {
                continue;
            };
            let destination = upload_dir.join(file_name);
            match fs_utils::move_file(&archived, &destination) {
                Ok(()) => {
                    let sink = batch.track(&destination);
                    pipeline.queue.enqueue(&destination, Some(sink))?;
                }
                Err(e) => {
                    tracing::error!("Failed to move {} back for reindexing: {}", archived.display(), e);
                    batch.push_ready(
                        &archived,
                        IndexReport::failed(
                            &self.identify(&archived),
                            format!("Failed to move {} to {}: {}", archived.display(), destination.display(), e),
                        ),
                    );
                }
            }
        }

        let failures = fs_utils::purge_directory(&self.config.processed_symbols_dir, true)
            + fs_utils::purge_directory(&self.config.processed_sources_dir, false);
        if failures > 0 {
            tracing::warn!("{} store entries could not be purged", failures);
        }

        tracing::info!("Reindexing {} package(s)", batch.len());
        pipeline.worker.start();
        Ok(batch.wait_all(self.config.timeouts.index(), |path| self.identify(path)))
    }

    fn archived_packages(&self) -> Result<Vec<PathBuf>> {
        let archive = &self.config.processed_packages_dir;
        let entries = match fs::read_dir(archive) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SymbolIndexError::io(archive, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Build the production pair if needed and start its worker
    pub fn start(&self) -> Result<()> {
        let pipeline = self.ensure_indexing_instances()?;
        pipeline.worker.start();
        tracing::info!("Symbol processor started");
        Ok(())
    }

    /// Stop the production worker, wait for it and tear the pair down
    pub fn stop(&self, clear_current_queue: bool) {
        let Some(pipeline) = self.production.lock().take() else {
            return;
        };
        pipeline.worker.stop(clear_current_queue).wait();
        tracing::info!("Symbol processor stopped");
    }

    /// Queue a package for indexing without waiting for its report
    pub fn enqueue(&self, path: impl AsRef<Path>) -> Result<()> {
        self.production()?.queue.enqueue(path, None)
    }

    /// Status of the production worker, if it exists
    pub fn status(&self) -> Option<WorkerStatus> {
        self.production
            .lock()
            .as_ref()
            .map(|pipeline| pipeline.worker.status())
    }
}

impl Drop for PackageProcessor {
    fn drop(&mut self) {
        let pipeline = self.production.lock().take();
        drop(pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreConfig;
    use tempfile::TempDir;

    struct NoopBackend;

    impl IndexingBackend for NoopBackend {
        fn load_identity(&self, _package: &Path) -> Option<PackageIdentity> {
            None
        }

        fn process(&self, _package: &Path, _unpack_dir: &Path, _stores: &StoreConfig) -> Result<()> {
            Ok(())
        }
    }

    fn processor(dir: &TempDir) -> PackageProcessor {
        let config = ProcessorConfig::with_root(dir.path(), "https://sources.example.com");
        PackageProcessor::new(config, Arc::new(NoopBackend)).unwrap()
    }

    #[test]
    fn test_operations_require_start() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let paths = vec![dir.path().join("A.1.0.symbols.nupkg")];

        assert!(matches!(
            processor.index(&paths),
            Err(SymbolIndexError::InvalidOperation { .. })
        ));
        assert!(matches!(
            processor.is_valid(&paths),
            Err(SymbolIndexError::InvalidOperation { .. })
        ));
        assert!(matches!(
            processor.rebuild_index(),
            Err(SymbolIndexError::InvalidOperation { .. })
        ));
        assert!(processor.status().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let config = ProcessorConfig::with_root(dir.path(), "");
        assert!(PackageProcessor::new(config, Arc::new(NoopBackend)).is_err());
    }

    #[test]
    fn test_huge_timeouts_wait_without_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = ProcessorConfig::with_root(dir.path(), "https://sources.example.com");
        config.timeouts.index_secs = u64::MAX;
        config.timeouts.validate_secs = u64::MAX;
        let processor = PackageProcessor::new(config, Arc::new(NoopBackend)).unwrap();
        processor.start().unwrap();

        let package = dir.path().join("A.1.0.symbols.nupkg");
        fs::write(&package, "package").unwrap();
        let reports = processor.index(&[PathBuf::new(), package]).unwrap();
        assert_eq!(reports[0].messages(), [EMPTY_PATH_MESSAGE.to_string()]);
        assert!(reports[1].is_success());

        let candidate = dir.path().join("B.2.0.symbols.nupkg");
        fs::write(&candidate, "package").unwrap();
        let outcome = processor.is_valid(&[candidate]).unwrap();
        assert!(outcome.is_valid);
    }

    #[test]
    fn test_empty_path_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        processor.start().unwrap();

        let reports = processor.index(&[PathBuf::new()]).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].package_id(), "Unknown");
        assert_eq!(reports[0].messages(), [EMPTY_PATH_MESSAGE.to_string()]);
    }

    #[test]
    fn test_empty_validation_batch_is_not_valid() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        processor.start().unwrap();

        let outcome = processor.is_valid(&[]).unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.reports.is_empty());
    }

    #[test]
    fn test_ensure_instances_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);

        let first = processor.ensure_indexing_instances().unwrap();
        let second = processor.ensure_indexing_instances().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_stop_tears_down_pair() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        processor.start().unwrap();
        assert!(processor.status().unwrap().is_started);

        processor.stop(false);
        assert!(processor.status().is_none());

        processor.start().unwrap();
        assert!(processor.status().is_some());
    }
}
