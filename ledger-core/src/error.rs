//! Error types for the ledger

use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Token record was not marked immutable by its producer
    #[error("Token {token_id} is not immutable and cannot be appended")]
    NotImmutable {
        /// Offending token
        token_id: Uuid,
    },

    /// Serialization error (canonical bytes)
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Export encoding error
    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(u64),

    /// Digest not found
    #[error("Digest not found: {0}")]
    DigestNotFound(Uuid),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Invalid hex-encoded hash or signature
    #[error("Invalid encoding: {0}")]
    Encoding(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
