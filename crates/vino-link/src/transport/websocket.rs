//! WebSocket transport built on tokio-tungstenite.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use super::{Transport, TransportEvent, TransportHandle, TransportSink};
use crate::error::LinkError;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket channels.
///
/// Each [`Transport::open`] spawns a socket task on the current tokio
/// runtime.
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a transport with the default connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set how long a connection attempt may take.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The configured connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    fn open(&self, endpoint: &str, sink: TransportSink) -> Box<dyn TransportHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            endpoint.to_string(),
            self.connect_timeout,
            sink,
            rx,
        ));
        Box::new(WsHandle { tx, task })
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct WsHandle {
    tx: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl TransportHandle for WsHandle {
    fn send(&mut self, text: String) -> Result<(), LinkError> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| LinkError::Transport("socket task has stopped".to_string()))
    }

    fn close(&mut self) {
        // Socket task already finished
        if self.tx.send(Outbound::Close).is_err() {
            self.task.abort();
        }
    }
}

async fn run_socket(
    endpoint: String,
    connect_timeout: Duration,
    sink: TransportSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    debug!(endpoint = %endpoint, generation = sink.generation(), "opening websocket");

    let connect = timeout(connect_timeout, connect_async(endpoint.as_str()));
    tokio::pin!(connect);

    // A close requested during the handshake abandons it
    let connected = loop {
        tokio::select! {
            biased;

            out = outbound.recv() => match out {
                Some(Outbound::Text(_)) => trace!("dropping message queued before open"),
                Some(Outbound::Close) | None => {
                    debug!(generation = sink.generation(), "websocket closed during handshake");
                    sink.emit(TransportEvent::Closed {
                        reason: "closed by client".to_string(),
                    });
                    return;
                }
            },

            result = &mut connect => break result,
        }
    };

    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            sink.emit(TransportEvent::Error(format!("failed to connect: {e}")));
            sink.emit(TransportEvent::Closed {
                reason: "connection failed".to_string(),
            });
            return;
        }
        Err(_) => {
            sink.emit(TransportEvent::Error(format!(
                "connection timed out after {} ms",
                connect_timeout.as_millis()
            )));
            sink.emit(TransportEvent::Closed {
                reason: "connection timed out".to_string(),
            });
            return;
        }
    };

    sink.emit(TransportEvent::Opened);
    let (mut write, mut read) = ws.split();

    let reason = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        sink.emit(TransportEvent::Message(text));
                    }
                    Err(_) => {
                        sink.emit(TransportEvent::Error(
                            "binary frame is not valid UTF-8".to_string(),
                        ));
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "server closed connection".to_string(),
                        |f| format!("server closed connection ({}): {}", u16::from(f.code), f.reason.as_str()),
                    );
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                    trace!("ignoring control frame");
                }
                Some(Err(e)) => {
                    sink.emit(TransportEvent::Error(format!("websocket error: {e}")));
                    break format!("websocket error: {e}");
                }
                None => break "connection closed".to_string(),
            },

            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        sink.emit(TransportEvent::Error(format!("write failed: {e}")));
                        break format!("write failed: {e}");
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "failed to send close frame");
                    }
                    break "closed by client".to_string();
                }
            },
        }
    };

    debug!(generation = sink.generation(), reason = %reason, "websocket closed");
    sink.emit(TransportEvent::Closed { reason });
}
