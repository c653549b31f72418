//! Config command handler

use crate::cli::OutputFormat;
use crate::error::Result;

use super::{to_json, CommandContext, CommandOutput};

/// Print the effective configuration
pub fn run_config(ctx: &CommandContext) -> Result<CommandOutput> {
    let text = match ctx.format {
        OutputFormat::Text => ctx.config.to_toml()?,
        OutputFormat::Json => to_json(&ctx.config)?,
    };
    Ok(CommandOutput::success(text))
}
