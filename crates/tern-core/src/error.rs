//! Error types for tern-core.

use thiserror::Error;

/// Result type for tern-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tern-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Chunk options could not be parsed.
    #[error("invalid chunk options: {0}")]
    Options(String),

    /// Chunk source could not be resolved.
    #[error("invalid chunk source: {0}")]
    Source(String),

    /// An execution engine rejected a chunk.
    #[error("engine error: {0}")]
    Engine(String),

    /// Console command injection failed.
    #[error("console injection failed: {0}")]
    Injection(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
