//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Source-index symbol packages and publish them to symbol and source stores
#[derive(Parser, Debug)]
#[command(name = "symbol-indexer")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "SYMBOL_INDEXER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Show verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================
// Main Commands Enum
// ============================================

/// Available subcommands for symbol-indexer
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the processor and index packages as they are uploaded
    Serve(ServeArgs),

    /// Index symbol packages into the production stores
    Index(PackageArgs),

    /// Check that symbol packages index cleanly without publishing them
    Validate(PackageArgs),

    /// Reprocess every archived package from scratch
    Rebuild,

    /// Print the effective configuration as TOML
    Config,
}

// ============================================
// Command Arguments
// ============================================

/// Arguments for `serve`
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Do not watch the upload directory; only packages present at startup
    /// are indexed
    #[arg(long)]
    pub no_watch: bool,
}

/// Arguments for commands that take package paths
#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Symbol packages (*.symbols.nupkg)
    #[arg(required = true)]
    pub packages: Vec<PathBuf>,
}

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    #[value(alias = "pretty")]
    Text,
    /// JSON - standard JSON output for machine parsing
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_index_with_global_flags() {
        let cli = Cli::parse_from([
            "symbol-indexer",
            "index",
            "A.1.0.symbols.nupkg",
            "B.2.0.symbols.nupkg",
            "--format",
            "json",
            "-v",
        ]);

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        match cli.command {
            Commands::Index(args) => assert_eq!(args.packages.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_requires_packages() {
        assert!(Cli::try_parse_from(["symbol-indexer", "validate"]).is_err());
    }
}
