//! Session relay error types.
//!
//! Errors carry an integer code and a client-safe message for the `error`
//! wire event. Internal details are logged server-side but never sent to
//! clients.

use crate::config::ConfigError;

use thiserror::Error;

/// Session relay error type.
///
/// Maps to wire error codes:
/// - `InvalidEvent`: `BAD_REQUEST` (1)
/// - `Internal`, `Config`, `Transport`: `INTERNAL_ERROR` (6)
/// - `Draining`: `UNAVAILABLE` (7)
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relay is draining (graceful shutdown); new connections are refused.
    #[error("Relay is draining")]
    Draining,

    /// A client frame could not be decoded into an event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Socket-level failure (bind, accept, send).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error (actor channel closed, task failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the wire error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RelayError::InvalidEvent(_) => 1, // BAD_REQUEST
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                6 // INTERNAL_ERROR
            }
            RelayError::Draining => 7, // UNAVAILABLE
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RelayError::Draining => "Server is shutting down, please reconnect".to_string(),
            RelayError::InvalidEvent(_) => "Malformed or unknown event".to_string(),
        }
    }
}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::InvalidEvent(err.to_string())
    }
}
