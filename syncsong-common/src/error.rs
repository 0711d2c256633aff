//! Common error types for Sync-Song

use thiserror::Error;

/// Common result type for Sync-Song operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the authority and participants
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wire frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user input or command parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
