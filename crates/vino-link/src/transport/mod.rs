//! Transport abstraction.
//!
//! The session client drives a full-duplex, message-oriented channel
//! without knowing how it is implemented. A transport reports what happens
//! to the channel through a [`TransportSink`]; the client writes to the
//! channel through the [`TransportHandle`] returned by [`Transport::open`].

use tokio::sync::mpsc;

use crate::error::LinkError;

#[cfg(feature = "websocket")]
mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::WsTransport;

/// Notification from a transport about its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open.
    Opened,
    /// A text payload arrived.
    Message(String),
    /// The channel ended, for any reason.
    ///
    /// Reported at most once per opened handle, including when the
    /// connection could not be established.
    Closed {
        /// Human-readable reason.
        reason: String,
    },
    /// Something went wrong; a `Closed` may or may not follow.
    Error(String),
}

/// A [`TransportEvent`] tagged with the handle it came from.
#[derive(Debug)]
pub(crate) struct Notification {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

/// Where a transport reports events for one opened handle.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Notification>,
}

impl TransportSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { generation, tx }
    }

    /// Which connection attempt this sink belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` if the client has been disposed.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Notification {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Whether the client is still listening.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Write side of one opened channel.
pub trait TransportHandle: Send {
    /// Queue a text payload for delivery.
    fn send(&mut self, text: String) -> Result<(), LinkError>;

    /// Request shutdown of the channel.
    fn close(&mut self);
}

/// Opens channels to a session server.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a channel to `endpoint`.
    ///
    /// Must return without waiting for the connection; the outcome is
    /// reported through `sink`.
    fn open(&self, endpoint: &str, sink: TransportSink) -> Box<dyn TransportHandle>;
}
