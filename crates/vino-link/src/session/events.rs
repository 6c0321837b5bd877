//! Session event types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::LinkError;

/// Kinds of events a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection established.
    Connected,
    /// Connection lost or closed.
    Disconnected,
    /// Reconnection scheduled.
    Reconnecting,
    /// Inbound message decoded.
    Message,
    /// Recoverable error.
    Error,
    /// Reconnection attempts ran out.
    Exhausted,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Connected,
        Self::Disconnected,
        Self::Reconnecting,
        Self::Message,
        Self::Error,
        Self::Exhausted,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Message => "message",
            Self::Error => "error",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Events emitted by the session client.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Successfully connected.
    Connected,
    /// Connection ended.
    Disconnected {
        /// Reason reported by the transport.
        reason: String,
        /// Whether the close was requested through `close()`.
        intentional: bool,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Decoded message from the session server.
    Message(Value),
    /// Recoverable error; the connection state is unaffected.
    Error(Arc<LinkError>),
    /// Reconnection failed permanently.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl SessionEvent {
    /// The kind subscribers register for to receive this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Exhausted { .. } => EventKind::Exhausted,
        }
    }

    pub(crate) fn error(err: LinkError) -> Self {
        Self::Error(Arc::new(err))
    }
}
