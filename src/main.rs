//! symbol-indexer CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use symbol_indexer::cli::{Cli, Commands};
use symbol_indexer::commands::{
    run_config, run_index, run_rebuild, run_serve, run_validate, CommandContext, CommandOutput,
};
use symbol_indexer::config::ProcessorConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(3);
        }
    };
    init_tracing(&config, cli.verbose);

    match run(&cli, config) {
        Ok(output) => {
            print!("{}", output.text);
            if output.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ProcessorConfig> {
    use anyhow::Context;

    match &cli.config {
        Some(path) => ProcessorConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => ProcessorConfig::load().context("loading default configuration"),
    }
}

/// Logs go to stderr. `RUST_LOG` overrides the configured level; `-v`
/// forces debug.
fn init_tracing(config: &ProcessorConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli, config: ProcessorConfig) -> symbol_indexer::Result<CommandOutput> {
    let ctx = CommandContext::new(cli.format, config);

    match &cli.command {
        Commands::Serve(args) => run_serve(args, &ctx),
        Commands::Index(args) => run_index(args, &ctx),
        Commands::Validate(args) => run_validate(args, &ctx),
        Commands::Rebuild => run_rebuild(&ctx),
        Commands::Config => run_config(&ctx),
    }
}
