//! Validate command handler
//!
//! Packages run through a throwaway pipeline whose archive and stores live
//! under the temp directory; nothing reaches the production stores.
//! A package that validates is moved into the throwaway archive, so the
//! command works on staged copies and leaves the caller's files alone.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::{OutputFormat, PackageArgs};
use crate::error::{Result, SymbolIndexError};
use crate::fs_utils;

use super::{format_reports, to_json, CommandContext, CommandOutput};

/// Copy `packages` into `staging`. Paths that are not files are passed
/// through unchanged so the processor reports them.
fn stage(packages: &[PathBuf], staging: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(staging).map_err(|e| SymbolIndexError::io(staging, e))?;

    packages
        .iter()
        .enumerate()
        .map(|(index, package)| {
            let (true, Some(name)) = (package.is_file(), package.file_name()) else {
                return Ok(package.clone());
            };
            // One directory per package keeps equal file names apart
            let slot = staging.join(index.to_string());
            fs::create_dir_all(&slot).map_err(|e| SymbolIndexError::io(&slot, e))?;
            let copy = slot.join(name);
            fs::copy(package, &copy).map_err(|e| SymbolIndexError::io(package, e))?;
            Ok(copy)
        })
        .collect()
}

pub fn run_validate(args: &PackageArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    let processor = ctx.processor()?;
    processor.start()?;

    let staging = fs_utils::unique_dir(&ctx.config.temp_dir);
    let outcome = stage(&args.packages, &staging).and_then(|staged| processor.is_valid(&staged));
    processor.stop(false);
    fs_utils::remove_dir_logged(&staging, "staging directory");
    let outcome = outcome?;

    let text = match ctx.format {
        OutputFormat::Text => {
            let verdict = if outcome.is_valid { "valid" } else { "invalid" };
            format!("{}packages are {}\n", format_reports(&outcome.reports), verdict)
        }
        OutputFormat::Json => to_json(&outcome)?,
    };

    Ok(CommandOutput {
        text,
        success: outcome.is_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_copies_files_and_passes_others_through() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("A.1.0.symbols.nupkg");
        fs::write(&package, "pkg").unwrap();
        let missing = dir.path().join("B.2.0.symbols.nupkg");

        let staged = stage(&[package.clone(), missing.clone()], &dir.path().join("staging")).unwrap();

        assert_eq!(staged.len(), 2);
        assert!(staged[0].starts_with(dir.path().join("staging")));
        assert_eq!(fs::read_to_string(&staged[0]).unwrap(), "pkg");
        assert_eq!(staged[1], missing);
        assert!(package.exists());
    }
}
