//! Error types for scene-remote.

use thiserror::Error;

/// Main error type for all protocol engine operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (malformed header, malformed or non-object payload).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Encoded payload does not fit the 4-digit length header.
    #[error("Payload size {0} exceeds maximum 9999")]
    PayloadTooLarge(usize),

    /// Peer is not draining its socket; too many frames are queued.
    #[error("Write queue exceeded {0} pending frames")]
    Backpressure(usize),

    /// Connection closed or terminating.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No accessor registered under the requested name.
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// A set request carried a value the setter cannot accept.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Configuration file could not be used.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using RemoteError.
pub type Result<T> = std::result::Result<T, RemoteError>;
