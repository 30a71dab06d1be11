//! Core error types.

use thiserror::Error;

/// Core query errors.
///
/// Protocol-contract violations (running a phase round out of order, releasing
/// a block twice) are programming errors and panic instead of surfacing here.
#[derive(Debug, Error)]
pub enum Error {
    /// The plan could not be resolved; the whole query is rejected.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A pipeline or retrieval call failed while executing.
    #[error("execution error: {0}")]
    Execution(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] forkql_proto::Error),

    /// Plan serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn resolution(message: impl Into<String>) -> Self {
        Error::Resolution(message.into())
    }

    pub(crate) fn execution(message: impl Into<String>) -> Self {
        Error::Execution(message.into())
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
