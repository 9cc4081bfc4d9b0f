//! Common error types for CineSync.

use thiserror::Error;

/// Result type alias using CineSync's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for CineSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, socket, pipe)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection to the sync server failed or dropped
    #[error("transport error: {0}")]
    Transport(String),

    /// User input rejected before any network action
    #[error("validation error: {0}")]
    Validation(String),

    /// External player process could not be started
    #[error("process error: {0}")]
    Process(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a protocol error from any displayable type.
    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a validation error from any displayable type.
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Create a process error from any displayable type.
    pub fn process(msg: impl std::fmt::Display) -> Self {
        Self::Process(msg.to_string())
    }

    /// Create a timeout error from any displayable type.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
