//! Error types for the mint queue

use admission_control::{AbusePattern, RecommendedAction};
use thiserror::Error;
use uuid::Uuid;

use crate::types::RequestStatus;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Mint queue errors
#[derive(Error, Debug)]
pub enum Error {
    /// Request shape rejected before enqueue
    #[error("Validation error: {0}")]
    Validation(String),

    /// A drained job is still outstanding
    #[error("Batch {batch_id} already processing")]
    BatchInFlight {
        /// The outstanding job
        batch_id: Uuid,
    },

    /// Job was already claimed by another `process_batch` call
    #[error("Batch {batch_id} is already being processed")]
    BatchAlreadyClaimed {
        /// The claimed job
        batch_id: Uuid,
    },

    /// Job is not the one currently in flight
    #[error("Batch {batch_id} is not in flight")]
    UnknownBatch {
        /// The offending job
        batch_id: Uuid,
    },

    /// Status lifecycle violation
    #[error("Request {request_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Request
        request_id: Uuid,
        /// Current status
        from: RequestStatus,
        /// Requested status
        to: RequestStatus,
    },

    /// Admission refused because the activity looks abusive
    #[error("Abuse suspected: {pattern}")]
    AbuseSuspected {
        /// Matched pattern
        pattern: AbusePattern,
        /// Recommended action
        action: Option<RecommendedAction>,
    },

    /// Admission control error
    #[error("Admission error: {0}")]
    Admission(#[from] admission_control::Error),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
