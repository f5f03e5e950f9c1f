//! Error types for the bus session runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bus session runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to establish the bus connection.
    #[error("Failed to connect to session bus: {0}")]
    ConnectionFailed(String),

    /// Transport-level error (framing, stream I/O).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Protocol-level error (malformed or unexpected message).
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Error reply from the remote peer.
    #[error("{name}: {message}")]
    Bus {
        /// Error name (e.g., "org.example.Error.Failed")
        name: String,
        /// Human-readable error message
        message: String,
    },

    /// Session closed while a call was outstanding.
    #[error("Session closed unexpectedly")]
    ChannelClosed,

    /// Timeout waiting for a reply.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error name if this is a remote bus error.
    pub fn bus_error_name(&self) -> Option<&str> {
        match self {
            Error::Bus { name, .. } => Some(name),
            _ => None,
        }
    }

}
