//! Thread-safe FIFO of symbol packages waiting to be indexed
//!
//! Producers call [`WorkQueue::enqueue`]; each enqueue synchronously notifies
//! every subscribed [`EnqueueListener`] after the entry is visible in the
//! queue. Listeners are held weakly so the queue never keeps a worker alive.
//!
//! The queue lock is never held while listeners run.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, SymbolIndexError};
use crate::report::IndexReport;

/// Callback that receives the report for a queued package
pub type ReportSink = Box<dyn FnOnce(IndexReport) + Send + 'static>;

/// Receives a call every time an entry is added to a [`WorkQueue`]
pub trait EnqueueListener: Send + Sync {
    fn on_enqueue(&self);
}

/// A package waiting in the queue
pub struct QueueEntry {
    pub path: PathBuf,
    pub report_sink: Option<ReportSink>,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("path", &self.path)
            .field("has_report_sink", &self.report_sink.is_some())
            .finish()
    }
}

/// Work queue shared between producers and an indexer worker
#[derive(Default)]
pub struct WorkQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    listeners: Mutex<Vec<Weak<dyn EnqueueListener>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue behind an `Arc`, the form workers share it in
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Append a package and notify listeners.
    ///
    /// Fails with `InvalidArgument` for an empty path.
    pub fn enqueue(&self, path: impl AsRef<Path>, report_sink: Option<ReportSink>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SymbolIndexError::InvalidArgument {
                message: "package path must not be empty".to_string(),
            });
        }

        self.entries.lock().push_back(QueueEntry {
            path: path.to_path_buf(),
            report_sink,
        });
        tracing::trace!("Queued {}", path.display());

        self.notify();
        Ok(())
    }

    /// Remove the head entry, if any. Never blocks on an empty queue.
    pub fn dequeue(&self) -> Option<QueueEntry> {
        self.entries.lock().pop_front()
    }

    /// Point-in-time emptiness check; may be stale as soon as it returns
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Register a listener for enqueue notifications
    pub fn subscribe(&self, listener: Weak<dyn EnqueueListener>) {
        self.listeners.lock().push(listener);
    }

    fn notify(&self) {
        let live: Vec<Arc<dyn EnqueueListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in live {
            listener.on_enqueue();
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
