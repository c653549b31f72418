//! Rebuild command handler

use crate::error::Result;

use super::{render_reports, CommandContext, CommandOutput};

/// Move every archived package back and index it again
pub fn run_rebuild(ctx: &CommandContext) -> Result<CommandOutput> {
    let processor = ctx.processor()?;
    processor.start()?;

    let reports = processor.rebuild_index();
    processor.stop(false);

    render_reports(ctx, reports?)
}
