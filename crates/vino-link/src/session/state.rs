//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// State of the session connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected to the session server.
    Connected,
    /// Connection lost, a reconnect is scheduled.
    Reconnecting,
    /// Permanently failed (max attempts exceeded).
    Failed,
}

impl ConnectionState {
    /// Every state, indexed by its discriminant.
    pub const ALL: [Self; 5] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Reconnecting,
        Self::Failed,
    ];

    /// Whether a connection is open or being opened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state readable without locking.
///
/// Written only by the session driver.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    /// Start in `state`.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// The last state stored.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        let index = usize::from(self.0.load(Ordering::Acquire));
        ConnectionState::ALL
            .get(index)
            .copied()
            .unwrap_or(ConnectionState::Failed)
    }

    /// Publish `state` to readers.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
