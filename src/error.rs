//! Error types for raidmend
//!
//! Synchronous operations return [`RebuildError`]. Asynchronous completions
//! never carry this type; they report an [`IoStatus`](crate::io::IoStatus)
//! through their continuation instead.

use thiserror::Error;

/// Result type alias using RebuildError
pub type Result<T> = std::result::Result<T, RebuildError>;

/// Unified error type for rebuild operations
#[derive(Debug, Error)]
pub enum RebuildError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Buffer Errors
    // -------------------------------------------------------------------------
    #[error("Buffer pool {owner} is empty")]
    BufferExhausted { owner: String },

    // -------------------------------------------------------------------------
    // Recovery Errors
    // -------------------------------------------------------------------------
    #[error("No recover method for array {array_index} at lba {lba}")]
    NoRecoverMethod { array_index: u32, lba: u64 },

    #[error("Recovery already attempted for this request")]
    RetryInProgress,

    // -------------------------------------------------------------------------
    // Geometry Errors
    // -------------------------------------------------------------------------
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    // -------------------------------------------------------------------------
    // Rebuild Log Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Rebuild log corruption detected: {0}")]
    LogCorruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
