//! Error types for session store operations

use thiserror::Error;

/// Result type for session store operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while persisting or loading session records
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No record exists for the requested session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No snapshot exists at the requested step
    #[error("No snapshot at step {step} for session {session_id}")]
    SnapshotNotFound { session_id: String, step: u64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Backend-specific storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record failed structural validation on read
    #[error("Invalid session record: {0}")]
    Invalid(String),

    /// I/O error from a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
