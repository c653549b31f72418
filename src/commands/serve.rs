//! Serve command handler
//!
//! Runs the processor as a long-lived service:
//! - The production worker indexes packages as they are queued
//! - The upload watcher queues packages already in the upload directory,
//!   then every new one
//!
//! Runs until the process is killed.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cli::ServeArgs;
use crate::error::Result;
use crate::watcher::{UploadTarget, UploadWatcher};

use super::{CommandContext, CommandOutput};

/// Interval between status log lines
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

pub fn run_serve(args: &ServeArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    let processor = ctx.processor()?;
    processor.start()?;

    tracing::info!(
        "Starting symbol-indexer v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Upload directory: {}", ctx.config.upload_dir.display());

    let watcher = UploadWatcher::new(ctx.config.upload_dir.clone(), ctx.config.watcher.clone());
    let _watcher_handle = if args.no_watch {
        for package in watcher.existing_packages()? {
            processor.enqueue(&package)?;
        }
        tracing::info!("Upload watcher disabled");
        None
    } else {
        let target: Arc<dyn UploadTarget> = processor.clone();
        Some(watcher.start(target)?)
    };

    loop {
        thread::sleep(STATUS_INTERVAL);
        if let Some(status) = processor.status() {
            tracing::debug!(
                "Worker status: started={} executing={} queued={} locked={}",
                status.is_started,
                status.is_executing,
                status.queued,
                status.locked_pending
            );
        }
    }
}
