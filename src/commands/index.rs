//! Index command handler

use crate::cli::PackageArgs;
use crate::error::Result;

use super::{render_reports, CommandContext, CommandOutput};

/// Index the given packages into the production stores
pub fn run_index(args: &PackageArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    let processor = ctx.processor()?;
    processor.start()?;

    let reports = processor.index(&args.packages);
    processor.stop(false);

    render_reports(ctx, reports?)
}
