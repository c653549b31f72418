//! Command modules for the symbol-indexer CLI
//!
//! Each command module implements a single top-level command:
//! - `serve` - Long-running processor with upload directory watching
//! - `index` - Index packages into the production stores
//! - `validate` - Dry-run packages through a disposable pipeline
//! - `rebuild` - Reprocess every archived package
//! - `config` - Show the effective configuration
//!
//! All command handlers take a shared `CommandContext` carrying the loaded
//! configuration and the output format.

pub mod config;
pub mod index;
pub mod rebuild;
pub mod serve;
pub mod validate;

pub use config::run_config;
pub use index::run_index;
pub use rebuild::run_rebuild;
pub use serve::run_serve;
pub use validate::run_validate;

use std::sync::Arc;

use crate::backend::ToolchainBackend;
use crate::cli::OutputFormat;
use crate::config::ProcessorConfig;
use crate::error::{Result, SymbolIndexError};
use crate::processor::PackageProcessor;
use crate::report::IndexReport;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Output format (text or json)
    pub format: OutputFormat,
    /// Loaded configuration
    pub config: ProcessorConfig,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config: ProcessorConfig) -> Self {
        Self { format, config }
    }

    /// Processor over the Debugging Tools backend, with its directories in place
    pub fn processor(&self) -> Result<Arc<PackageProcessor>> {
        self.config.ensure_directories()?;
        let processor = PackageProcessor::new(self.config.clone(), Arc::new(ToolchainBackend::new()))?;
        Ok(Arc::new(processor))
    }
}

/// Rendered command output and whether every package succeeded
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn success(text: String) -> Self {
        Self {
            text,
            success: true,
        }
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map(|json| format!("{}\n", json))
        .map_err(|e| SymbolIndexError::InvalidOperation {
            message: format!("JSON serialization failed: {}", e),
        })
}

/// Text rendering of a report list with a summary line
pub fn format_reports(reports: &[IndexReport]) -> String {
    let mut output = String::new();
    for report in reports {
        output.push_str(&format!(
            "{:<9}  {} {}\n",
            report.status(),
            report.package_id(),
            report.package_version()
        ));
        for message in report.messages() {
            output.push_str(&format!("           {}\n", message));
        }
    }

    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    output.push_str(&format!(
        "{} succeeded, {} failed\n",
        succeeded,
        reports.len() - succeeded
    ));
    output
}

/// Render reports in the requested format
pub(crate) fn render_reports(ctx: &CommandContext, reports: Vec<IndexReport>) -> Result<CommandOutput> {
    let success = reports.iter().all(IndexReport::is_success);
    let text = match ctx.format {
        OutputFormat::Text => format_reports(&reports),
        OutputFormat::Json => to_json(&reports)?,
    };
    Ok(CommandOutput { text, success })
}
