//! Request/response correlation between batch callers and the worker
//!
//! Each submitted package gets a single-resolution [`ReportPromise`]. The
//! worker resolves it through the [`ReportSink`] handed out by
//! [`ReportPromise::sink`]; the batch caller waits on all promises against a
//! single deadline. A sink that is dropped without being called leaves its
//! promise pending, so the caller observes a timeout for that package.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::queue::ReportSink;
use crate::report::{IndexReport, PackageIdentity};

/// Message used for packages that did not report before the batch deadline
pub const TIMEOUT_MESSAGE: &str = "failed to process within the allotted time";

/// `now + timeout`, or `None` when that overflows `Instant`
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[derive(Default)]
struct Slot {
    report: Mutex<Option<IndexReport>>,
    ready: Condvar,
}

/// One-shot report slot shared between a waiter and a sink
#[derive(Clone, Default)]
pub struct ReportPromise {
    slot: Arc<Slot>,
}

impl ReportPromise {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the promise. Only the first resolution is kept.
    pub fn resolve(&self, report: IndexReport) -> bool {
        let mut guard = self.slot.report.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(report);
        self.slot.ready.notify_all();
        true
    }

    /// Sink that resolves this promise when called
    pub fn sink(&self) -> ReportSink {
        let promise = self.clone();
        Box::new(move |report| {
            promise.resolve(report);
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.report.lock().is_some()
    }

    /// Block until resolved or `deadline` passes
    pub fn wait_until(&self, deadline: Instant) -> Option<IndexReport> {
        self.wait_deadline(Some(deadline))
    }

    /// Block for at most `timeout`. A timeout too large to express as an
    /// `Instant` waits without a limit.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<IndexReport> {
        self.wait_deadline(deadline_after(timeout))
    }

    fn wait_deadline(&self, deadline: Option<Instant>) -> Option<IndexReport> {
        let mut guard = self.slot.report.lock();
        while guard.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.slot.ready.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                None => self.slot.ready.wait(&mut guard),
            }
        }
        guard.clone()
    }
}

/// A report that is either already known or still owed by the pipeline
enum Pending {
    Ready(IndexReport),
    Waiting(ReportPromise),
}

/// Ordered collection of outstanding reports for one batch call
#[derive(Default)]
pub struct ReportBatch {
    entries: Vec<(PathBuf, Pending)>,
}

impl ReportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new package and return the sink the worker must call
    pub fn track(&mut self, path: &Path) -> ReportSink {
        let promise = ReportPromise::new();
        let sink = promise.sink();
        self.entries
            .push((path.to_path_buf(), Pending::Waiting(promise)));
        sink
    }

    /// Record a report that is known without going through the pipeline
    pub fn push_ready(&mut self, path: &Path, report: IndexReport) {
        self.entries.push((path.to_path_buf(), Pending::Ready(report)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for every report against one deadline.
    ///
    /// Packages still pending at the deadline get a synthesized failure,
    /// identified through `identify`. Reports keep submission order.
    pub fn wait_all<F>(self, timeout: Duration, identify: F) -> Vec<IndexReport>
    where
        F: Fn(&Path) -> PackageIdentity,
    {
        let deadline = deadline_after(timeout);
        self.entries
            .into_iter()
            .map(|(path, pending)| match pending {
                Pending::Ready(report) => report,
                Pending::Waiting(promise) => match promise.wait_deadline(deadline) {
                    Some(report) => report,
                    None => {
                        tracing::warn!(
                            "No report for {} within {:?}, reporting failure",
                            path.display(),
                            timeout
                        );
                        IndexReport::failed(&identify(&path), TIMEOUT_MESSAGE)
                    }
                },
            })
            .collect()
    }
}
