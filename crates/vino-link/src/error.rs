//! Error types for vino-link.

use thiserror::Error;

use crate::session::ConnectionState;

/// Errors that can occur in session client operations.
///
/// None of these are returned from `connect`, `send` or `close`; the client
/// reports them through `error` and `exhausted` events instead.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport could not establish a connection.
    #[error("transport failed to open: {0}")]
    TransportOpen(String),

    /// An inbound payload was not valid JSON.
    #[error("failed to decode message: {0}")]
    MessageDecode(String),

    /// A send was attempted without a live connection.
    #[error("cannot send while {state}")]
    SendWhileDisconnected {
        /// State the client was in when the send was dropped.
        state: ConnectionState,
    },

    /// Consecutive reconnection attempts ran out.
    #[error("gave up reconnecting after {attempts} attempts")]
    RetryExhausted {
        /// Number of reconnection attempts made.
        attempts: u32,
    },

    /// The transport reported a failure on an established channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbound payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// The endpoint could not be resolved.
    #[error("endpoint resolution failed: {0}")]
    Endpoint(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
