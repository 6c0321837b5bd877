//! Shared helpers for session client tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use vino_link::{
    EventKind, LinkError, SessionEvent, Transport, TransportEvent, TransportHandle, TransportSink,
};

/// What the scripted transport does on the next `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Report `Opened`.
    Open,
    /// Report `Error` followed by `Closed`.
    Fail,
    /// Report nothing until the test drives the sink.
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    script: VecDeque<Outcome>,
    opens: Vec<(Instant, String)>,
    sinks: Vec<TransportSink>,
    sent: Vec<String>,
    closes: usize,
}

/// In-memory transport whose connection outcomes are scripted.
///
/// Opens beyond the script fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        let transport = Self::default();
        transport.inner.lock().script.extend(script);
        transport
    }

    pub fn push(&self, outcome: Outcome) {
        self.inner.lock().script.push_back(outcome);
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.inner.lock().opens.iter().map(|(t, _)| *t).collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.inner.lock().opens.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Gaps between consecutive opens.
    pub fn open_gaps(&self) -> Vec<Duration> {
        self.open_times()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }

    /// Sink of the most recently opened handle.
    pub fn last_sink(&self) -> TransportSink {
        self.inner
            .lock()
            .sinks
            .last()
            .cloned()
            .expect("no handle has been opened")
    }

    /// Sink of the `index`-th opened handle.
    pub fn sink(&self, index: usize) -> TransportSink {
        self.inner.lock().sinks[index].clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, endpoint: &str, sink: TransportSink) -> Box<dyn TransportHandle> {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.opens.push((Instant::now(), endpoint.to_string()));
            inner.sinks.push(sink.clone());
            inner.script.pop_front().unwrap_or(Outcome::Fail)
        };

        match outcome {
            Outcome::Open => {
                sink.emit(TransportEvent::Opened);
            }
            Outcome::Fail => {
                sink.emit(TransportEvent::Error("connection refused".to_string()));
                sink.emit(TransportEvent::Closed {
                    reason: "connection refused".to_string(),
                });
            }
            Outcome::Hang => {}
        }

        Box::new(ScriptedHandle {
            inner: Arc::clone(&self.inner),
        })
    }
}

struct ScriptedHandle {
    inner: Arc<Mutex<Inner>>,
}

impl TransportHandle for ScriptedHandle {
    fn send(&mut self, text: String) -> Result<(), LinkError> {
        self.inner.lock().sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().closes += 1;
    }
}

/// Wait for the next event of `kind`, skipping others.
pub async fn next_of(rx: &mut mpsc::UnboundedReceiver<SessionEvent>, kind: EventKind) -> SessionEvent {
    timeout(Duration::from_secs(600), async {
        loop {
            match rx.recv().await {
                Some(event) if event.kind() == kind => return event,
                Some(_) => {}
                None => panic!("event channel closed while waiting for {kind}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}

/// Every event currently queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Kinds of the given events, in order.
pub fn kinds(events: &[SessionEvent]) -> Vec<EventKind> {
    events.iter().map(SessionEvent::kind).collect()
}
