//! Error types for `peerwire` core library.

use thiserror::Error;

/// Result type alias using `peerwire` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `peerwire` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Participant identifier rejected at the acceptance boundary
    #[error("Invalid participant id {id:?}: {reason}")]
    InvalidParticipant { id: String, reason: &'static str },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
