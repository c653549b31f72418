//! symbol-indexer: source indexing pipeline for symbol packages
//!
//! Uploaded `*.symbols.nupkg` packages are unpacked, their PDBs are
//! source-indexed so debuggers can fetch matching sources over HTTP, and
//! symbols and sources are published to shared stores. Each package gets
//! an [`IndexReport`].
//!
//! # Architecture
//!
//! ```text
//! caller ──► PackageProcessor ──► WorkQueue ──► IndexerWorker ──► IndexingBackend
//!                 ▲                                   │
//!                 └──────── ReportBatch ◄── report ───┘
//! ```
//!
//! - [`queue`]: Thread-safe FIFO with synchronous enqueue notification
//! - [`indexer`]: Single-execution background worker with locked-file retry
//! - [`processor`]: Batch `index`, sandboxed `is_valid`, `rebuild_index`
//! - [`correlation`]: One-shot report promises and deadline-bounded batches
//! - [`backend`]: The `IndexingBackend` trait and the Debugging Tools backend
//! - [`watcher`]: Upload directory watcher feeding the processor
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use symbol_indexer::{PackageProcessor, ProcessorConfig, ToolchainBackend};
//!
//! let config = ProcessorConfig::load()?;
//! let processor = PackageProcessor::new(config, Arc::new(ToolchainBackend::new()))?;
//! processor.start()?;
//! for report in processor.index(&["Nuclei.0.8.1.0.symbols.nupkg".into()])? {
//!     println!("{} {} {}", report.status(), report.package_id(), report.package_version());
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod correlation;
pub mod error;
pub mod fs_utils;
pub mod indexer;
pub mod package;
pub mod processor;
pub mod queue;
pub mod report;
pub mod watcher;

// Re-export commonly used types
pub use backend::{IndexingBackend, StoreConfig, ToolchainBackend};
pub use cli::{Cli, OutputFormat};
pub use config::{ProcessorConfig, RetryPolicy};
pub use correlation::{ReportBatch, ReportPromise, TIMEOUT_MESSAGE};
pub use error::{Result, SymbolIndexError};
pub use indexer::{IndexerWorker, StopHandle, WorkerConfig, WorkerStatus};
pub use processor::{IndexingPipeline, PackageProcessor, ValidationOutcome};
pub use queue::{EnqueueListener, QueueEntry, ReportSink, WorkQueue};
pub use report::{IndexReport, IndexStatus, PackageIdentity};
pub use watcher::{UploadTarget, UploadWatcher, WatcherHandle};
