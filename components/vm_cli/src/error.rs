//! Error types for the CLI

use bytecode_system::BytecodeError;
use thiserror::Error;
use tiering::OptimizerError;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// A workload could not be assembled
    #[error("failed to assemble workload: {0}")]
    Assembly(#[from] BytecodeError),

    /// The optimizer could not be started
    #[error("optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// The report could not be serialised
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid logging filter
    #[error("invalid log level '{0}'")]
    LogLevel(String),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
