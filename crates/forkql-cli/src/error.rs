//! CLI error types.

use thiserror::Error;

/// Errors surfaced by the command-line runner.
#[derive(Debug, Error)]
pub enum CliError {
    /// Query engine error.
    #[error(transparent)]
    Engine(#[from] forkql_core::Error),

    /// Failed to read an input file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The plan file is not a valid plan document.
    #[error("invalid plan: {0}")]
    Plan(#[from] serde_json::Error),
}
