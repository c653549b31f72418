//! Background indexer worker
//!
//! An [`IndexerWorker`] owns at most one background execution that drains a
//! [`WorkQueue`] and hands each package to an [`IndexingBackend`].
//!
//! ```text
//!  enqueue ──► WorkQueue ──on_enqueue──► WorkerShared::try_spawn
//!                                             │ (lifecycle lock)
//!                                             ▼
//!                                      execution thread
//!                     ┌───────────────────────┴──────────────────────┐
//!                     │ loop: cancelled? ─► exit                     │
//!                     │       next item (queue, then locked-retry)   │
//!                     │       none ─► retire under lifecycle lock    │
//!                     │       locked ─► locked-retry queue           │
//!                     │       backend.process ─► archive ─► report   │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! - All lifecycle state lives in one `parking_lot::Mutex<Lifecycle>`
//! - Lock order is lifecycle → queue (work queue or locked-retry queue)
//! - The spawn decision is taken on the enqueuing thread, under the
//!   lifecycle lock, so two executions can never overlap
//! - Panics from the backend or a report sink end the execution cleanly

use std::any::Any;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::{IndexingBackend, StoreConfig};
use crate::config::RetryPolicy;
use crate::correlation;
use crate::error::{Result, SymbolIndexError};
use crate::fs_utils;
use crate::package::{self, Availability};
use crate::queue::{EnqueueListener, ReportSink, WorkQueue};
use crate::report::{IndexReport, PackageIdentity};

/// Everything a worker needs to know about where packages go
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Tools and publication stores handed to the backend
    pub stores: StoreConfig,
    /// Archive for successfully processed packages
    pub processed_packages_dir: PathBuf,
    /// Parent of the worker's unpack root
    pub temp_dir: PathBuf,
    /// Locked-file retry policy
    pub retry: RetryPolicy,
}

// ============================================================================
// Lifecycle primitives
// ============================================================================

/// Cooperative cancellation flag, checked at the top of the execution loop
#[derive(Debug, Clone, Default)]
struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Latch released when an execution has fully finished
#[derive(Debug, Default)]
struct Completion {
    done: Mutex<bool>,
    finished: Condvar,
}

impl Completion {
    fn finish(&self) {
        *self.done.lock() = true;
        self.finished.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.finished.wait(&mut done);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut done = self.done.lock();
        while !*done {
            if self.finished.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        *done
    }
}

#[derive(Debug)]
struct Execution {
    id: u64,
    cancellation: CancellationToken,
    completion: Arc<Completion>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    is_started: bool,
    active: Option<Execution>,
    executions_spawned: u64,
}

/// A package waiting for its next attempt
struct LockedPackage {
    path: PathBuf,
    attempt_count: u32,
    report_sink: Option<ReportSink>,
}

/// Point-in-time view of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub is_started: bool,
    pub is_executing: bool,
    /// Executions spawned over the worker's lifetime
    pub executions_spawned: u64,
    /// Entries in the work queue
    pub queued: usize,
    /// Entries in the locked-retry queue
    pub locked_pending: usize,
}

/// Returned by [`IndexerWorker::stop`]; waits for the execution that was
/// active when the worker was stopped.
#[derive(Debug)]
#[must_use = "a stop request does not wait unless the handle is waited on"]
pub struct StopHandle {
    completion: Option<Arc<Completion>>,
}

impl StopHandle {
    /// Block until the execution has finished
    pub fn wait(self) {
        if let Some(completion) = self.completion {
            completion.wait();
        }
    }

    /// Block for at most `timeout`. Returns true if the execution finished.
    pub fn wait_timeout(self, timeout: Duration) -> bool {
        match self.completion {
            Some(completion) => match correlation::deadline_after(timeout) {
                Some(deadline) => completion.wait_until(deadline),
                None => {
                    completion.wait();
                    true
                }
            },
            None => true,
        }
    }
}

// ============================================================================
// Shared worker state
// ============================================================================

struct WorkerShared {
    queue: Arc<WorkQueue>,
    backend: Arc<dyn IndexingBackend>,
    config: WorkerConfig,
    unpack_root: PathBuf,
    lifecycle: Mutex<Lifecycle>,
    locked: Mutex<VecDeque<LockedPackage>>,
    this: Weak<WorkerShared>,
}

impl EnqueueListener for WorkerShared {
    fn on_enqueue(&self) {
        self.try_spawn();
    }
}

/// Clears the lifecycle slot and releases the completion latch however the
/// execution ends
struct ExecutionGuard<'a> {
    shared: &'a WorkerShared,
    id: u64,
    completion: Arc<Completion>,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.active.as_ref().is_some_and(|e| e.id == self.id) {
                lifecycle.active = None;
            }
        }
        self.completion.finish();
        tracing::trace!("Indexing execution {} finished", self.id);

        // A start() that raced with a cancellation found this execution
        // still active and did not spawn.
        self.shared.try_spawn();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WorkerShared {
    fn has_work(&self) -> bool {
        !self.queue.is_empty() || !self.locked.lock().is_empty()
    }

    /// Spawn an execution if the worker is started, idle, and has work
    fn try_spawn(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.is_started || lifecycle.active.is_some() || !self.has_work() {
            return;
        }
        let Some(shared) = self.this.upgrade() else {
            return;
        };

        let id = lifecycle.executions_spawned + 1;
        let cancellation = CancellationToken::default();
        let completion = Arc::new(Completion::default());

        let token = cancellation.clone();
        let latch = completion.clone();
        let spawned = thread::Builder::new()
            .name(format!("symbol-indexer-{}", id))
            .spawn(move || shared.run(id, token, latch));

        match spawned {
            Ok(_) => {
                lifecycle.executions_spawned = id;
                lifecycle.active = Some(Execution {
                    id,
                    cancellation,
                    completion,
                });
                tracing::trace!("Spawned indexing execution {}", id);
            }
            Err(e) => {
                tracing::error!("Failed to spawn indexing execution: {}", e);
            }
        }
    }

    fn run(&self, id: u64, cancellation: CancellationToken, completion: Arc<Completion>) {
        let _guard = ExecutionGuard {
            shared: self,
            id,
            completion,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(id, &cancellation)));
        if let Err(payload) = outcome {
            tracing::error!(
                "Indexing execution {} panicked: {}",
                id,
                panic_message(payload.as_ref())
            );
        }
    }

    fn execute(&self, id: u64, cancellation: &CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                tracing::debug!("Indexing execution {} cancelled", id);
                return;
            }

            let Some(item) = self.next_item() else {
                let mut lifecycle = self.lifecycle.lock();
                if self.has_work() {
                    continue;
                }
                if lifecycle.active.as_ref().is_some_and(|e| e.id == id) {
                    lifecycle.active = None;
                }
                tracing::trace!("Queues empty, indexing execution {} retiring", id);
                return;
            };

            self.handle(item);
        }
    }

    fn next_item(&self) -> Option<LockedPackage> {
        if let Some(entry) = self.queue.dequeue() {
            return Some(LockedPackage {
                path: entry.path,
                attempt_count: 0,
                report_sink: entry.report_sink,
            });
        }
        self.locked.lock().pop_front()
    }

    fn handle(&self, mut item: LockedPackage) {
        let retry = &self.config.retry;
        if item.attempt_count > retry.maximum_attempts {
            tracing::warn!(
                "Dropping {}: still locked after {} attempts",
                item.path.display(),
                retry.maximum_attempts
            );
            return;
        }

        match package::wait_until_available(&item.path, retry) {
            Ok(Availability::Available) => self.index_package(&item.path, item.report_sink),
            Ok(Availability::Locked) => {
                item.attempt_count += 1;
                tracing::debug!(
                    "{} is locked, queued for retry (attempt {})",
                    item.path.display(),
                    item.attempt_count
                );
                self.locked.lock().push_back(item);
            }
            Err(e) => {
                let identity = package::identify(self.backend.as_ref(), &item.path);
                tracing::error!("Failed to open {}: {}", item.path.display(), e);
                deliver(
                    item.report_sink,
                    IndexReport::failed(
                        &identity,
                        format!("Failed to open {}: {}", item.path.display(), e),
                    ),
                );
            }
        }
    }

    fn index_package(&self, path: &Path, sink: Option<ReportSink>) {
        let identity = package::identify(self.backend.as_ref(), path);
        tracing::info!("Processing {} from {}", identity, path.display());

        let unpack_dir = if identity.is_path_safe() {
            self.unpack_root.join(identity.directory_name())
        } else {
            tracing::warn!(
                "{} is not usable as a directory name, unpacking {} under a generated name",
                identity,
                path.display()
            );
            fs_utils::unique_dir(&self.unpack_root)
        };
        let report = self.process(path, &unpack_dir, &identity);
        fs_utils::remove_dir_logged(&unpack_dir, "unpack directory");

        deliver(sink, report);
    }

    fn process(&self, path: &Path, unpack_dir: &Path, identity: &PackageIdentity) -> IndexReport {
        fs_utils::remove_dir_logged(unpack_dir, "stale unpack directory");
        if let Err(e) = fs::create_dir_all(unpack_dir) {
            tracing::error!("Failed to create {}: {}", unpack_dir.display(), e);
            return IndexReport::failed(identity, SymbolIndexError::io(unpack_dir, e).to_string());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.process(path, unpack_dir, &self.config.stores)
        }));

        match outcome {
            Ok(Ok(())) => {
                self.archive(path, identity);
                tracing::info!("Indexed {}", identity);
                IndexReport::succeeded(identity)
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to index {}: {}", identity, e);
                IndexReport::failed(identity, e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Indexing {} panicked: {}", identity, message);
                IndexReport::failed(identity, format!("indexing panicked: {}", message))
            }
        }
    }

    /// Move a processed package into the archive. Failures are logged only.
    fn archive(&self, path: &Path, identity: &PackageIdentity) {
        let archive_dir = &self.config.processed_packages_dir;
        if let Err(e) = fs::create_dir_all(archive_dir) {
            tracing::error!("Failed to create {}: {}", archive_dir.display(), e);
            return;
        }
        let Some(file_name) = path.file_name() else {
            return;
        };

        let destination = archive_dir.join(file_name);
        match fs_utils::move_file(path, &destination) {
            Ok(()) => tracing::debug!("Archived {} to {}", identity, destination.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!("{} is already archived at {}", identity, destination.display())
            }
            Err(e) => tracing::error!("Failed to archive {}: {}", path.display(), e),
        }
    }
}

fn deliver(sink: Option<ReportSink>, report: IndexReport) {
    if let Some(sink) = sink {
        sink(report);
    }
}

// ============================================================================
// Public worker handle
// ============================================================================

/// Drains a work queue on a background thread
pub struct IndexerWorker {
    shared: Arc<WorkerShared>,
}

impl IndexerWorker {
    /// Create a stopped worker subscribed to `queue`.
    ///
    /// # Errors
    ///
    /// Fails if the unpack root under `config.temp_dir` cannot be created.
    pub fn new(
        queue: Arc<WorkQueue>,
        backend: Arc<dyn IndexingBackend>,
        config: WorkerConfig,
    ) -> Result<Self> {
        let unpack_root = fs_utils::unique_dir(&config.temp_dir);
        fs::create_dir_all(&unpack_root).map_err(|e| SymbolIndexError::io(&unpack_root, e))?;

        let shared = Arc::new_cyclic(|this| WorkerShared {
            queue: queue.clone(),
            backend,
            config,
            unpack_root,
            lifecycle: Mutex::new(Lifecycle::default()),
            locked: Mutex::new(VecDeque::new()),
            this: this.clone(),
        });

        let listener: Weak<dyn EnqueueListener> = Arc::downgrade(&shared) as Weak<dyn EnqueueListener>;
        queue.subscribe(listener);

        Ok(Self { shared })
    }

    /// Start processing. Idempotent; picks up any backlog.
    pub fn start(&self) {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if !lifecycle.is_started {
                tracing::debug!("Starting indexer worker");
            }
            lifecycle.is_started = true;
        }
        self.shared.try_spawn();
    }

    /// Stop processing.
    ///
    /// With `clear_current_queue` the active execution drains everything
    /// that is queued. Without it, the execution is cancelled after the
    /// package in flight, provided the work queue is not empty.
    pub fn stop(&self, clear_current_queue: bool) -> StopHandle {
        let mut lifecycle = self.shared.lifecycle.lock();
        lifecycle.is_started = false;

        let completion = lifecycle.active.as_ref().map(|execution| {
            if !clear_current_queue && !self.shared.queue.is_empty() {
                tracing::debug!("Cancelling indexing execution {}", execution.id);
                execution.cancellation.cancel();
            }
            execution.completion.clone()
        });
        tracing::debug!("Stopping indexer worker (drain: {})", clear_current_queue);

        StopHandle { completion }
    }

    pub fn status(&self) -> WorkerStatus {
        let lifecycle = self.shared.lifecycle.lock();
        WorkerStatus {
            is_started: lifecycle.is_started,
            is_executing: lifecycle.active.is_some(),
            executions_spawned: lifecycle.executions_spawned,
            queued: self.shared.queue.len(),
            locked_pending: self.shared.locked.lock().len(),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.shared.queue
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// Directory that holds this worker's per-package unpack directories
    pub fn unpack_root(&self) -> &Path {
        &self.shared.unpack_root
    }
}

impl Drop for IndexerWorker {
    fn drop(&mut self) {
        self.stop(false).wait();
        fs_utils::remove_dir_logged(&self.shared.unpack_root, "unpack root");
    }
}
