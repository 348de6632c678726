//! Error types for the reverie core library.

use thiserror::Error;

use crate::types::MemoryId;

/// Top-level error type for all reverie core operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// A record with the given ID was not found in the store.
    #[error("Memory record not found: {0}")]
    RecordNotFound(MemoryId),

    /// A derived record cites evidence that does not exist (yet) in the store.
    #[error("Record {record} cites unknown evidence {evidence}")]
    UnknownEvidence {
        /// The record being created or restored.
        record: MemoryId,
        /// The evidence id that could not be resolved.
        evidence: MemoryId,
    },

    /// A simulated timestamp could not be parsed.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding provider failed: {0}")]
    Embedding(String),

    /// The cognition collaborator failed terminally.
    #[error("Cognition provider failed: {0}")]
    Cognition(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReverieError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
