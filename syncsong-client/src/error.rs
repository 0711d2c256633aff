//! Error types for syncsong-client
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the participant
#[derive(Error, Debug)]
pub enum Error {
    /// Shared protocol/config errors
    #[error(transparent)]
    Common(#[from] syncsong_common::Error),

    /// WebSocket transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Reconnect ceiling reached; surfaced to the user as a hard disconnect
    #[error("Disconnected after {attempts} reconnect attempts")]
    Disconnected { attempts: u32 },

    /// Embedded player errors (failed mutation or unavailable capability)
    #[error("Player error: {0}")]
    Player(String),

    /// Lobby HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration or arguments
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using syncsong-client Error
pub type Result<T> = std::result::Result<T, Error>;
