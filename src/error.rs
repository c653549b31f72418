//! Error types and exit codes for symbol-indexer

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for symbol-indexer operations
#[derive(Error, Debug)]
pub enum SymbolIndexError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid symbol package {path}: {message}")]
    PackageError { path: PathBuf, message: String },

    #[error("{tool} failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("IO error at {path}: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SymbolIndexError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Convert error to an exit code:
    /// - 0: Success
    /// - 1: At least one package failed (reported by the CLI, not an error)
    /// - 2: Invalid argument / invalid operation
    /// - 3: Configuration error
    /// - 4: Package or tool failure
    /// - 5: IO error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidArgument { .. } => ExitCode::from(2),
            Self::InvalidOperation { .. } => ExitCode::from(2),
            Self::ConfigError { .. } => ExitCode::from(3),
            Self::PackageError { .. } => ExitCode::from(4),
            Self::ToolError { .. } => ExitCode::from(4),
            Self::IoError { .. } => ExitCode::from(5),
            Self::Io(_) => ExitCode::from(5),
        }
    }
}

/// Result type alias for symbol-indexer operations
pub type Result<T> = std::result::Result<T, SymbolIndexError>;
