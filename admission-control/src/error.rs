//! Error types for admission control

use thiserror::Error;

/// Admission control error
#[derive(Debug, Error)]
pub enum Error {
    /// Charge below threshold; retry after more activity
    #[error("Insufficient charge: {charge:.2} < {threshold:.2} (need {needed:.2} more)")]
    InsufficientCharge {
        /// Charge at the time of the attempt
        charge: f64,
        /// Admission threshold
        threshold: f64,
        /// Exact deficit
        needed: f64,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
