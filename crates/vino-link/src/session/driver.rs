//! Driver task that executes machine effects.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::machine::{Effect, Input, SessionMachine};
use super::state::{AtomicConnectionState, ConnectionState};
use super::subscribers::{self, SharedSubscribers};
use crate::endpoint::EndpointResolver;
use crate::error::LinkError;
use crate::transport::{Notification, Transport, TransportHandle, TransportSink};

/// Requests from the client handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Send(String),
    /// Payload that could not be encoded on the caller's side.
    Rejected(LinkError),
    Close,
    Dispose,
}

/// State readable from the handle without a round trip.
#[derive(Debug)]
pub(crate) struct SharedStatus {
    pub(crate) state: AtomicConnectionState,
    pub(crate) attempt: AtomicU32,
}

impl SharedStatus {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            attempt: AtomicU32::new(0),
        }
    }
}

/// Owns the machine, the live transport handle and the reconnect timer.
///
/// Runs as a single task: commands, transport notifications and the timer
/// are handled one at a time.
pub(crate) struct Driver {
    machine: SessionMachine,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn EndpointResolver>,
    subscribers: SharedSubscribers,
    status: Arc<SharedStatus>,
    handle: Option<Box<dyn TransportHandle>>,
    timer: Option<Pin<Box<Sleep>>>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl Driver {
    pub(crate) fn new(
        machine: SessionMachine,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn EndpointResolver>,
        subscribers: SharedSubscribers,
        status: Arc<SharedStatus>,
        notify_tx: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            machine,
            transport,
            resolver,
            subscribers,
            status,
            handle: None,
            timer: None,
            notify_tx,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
    ) {
        loop {
            let input = tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(Command::Connect) => Input::Connect,
                    Some(Command::Send(text)) => Input::Send(text),
                    Some(Command::Rejected(err)) => {
                        warn!(error = %err, "dropping payload");
                        self.emit(&SessionEvent::error(err));
                        continue;
                    }
                    Some(Command::Close) => Input::Close,
                    Some(Command::Dispose) | None => break,
                },

                Some(note) = notifications.recv() => Input::Transport {
                    generation: note.generation,
                    event: note.event,
                },

                () = wait_for(&mut self.timer) => {
                    self.timer = None;
                    Input::ReconnectTimer
                }
            };

            self.step(input);
        }

        self.shutdown();
    }

    /// Feed an input through the machine and carry out its effects.
    fn step(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            let effects = self.machine.handle(input);
            self.publish();
            for effect in effects {
                if let Some(next) = self.apply(effect) {
                    pending.push_back(next);
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Open { generation } => return self.open(generation),
            Effect::CloseTransport => {
                if let Some(mut handle) = self.handle.take() {
                    handle.close();
                }
            }
            Effect::Transmit(text) => match self.handle.as_mut() {
                Some(handle) => {
                    if let Err(err) = handle.send(text) {
                        warn!(error = %err, "transport rejected payload");
                        self.emit(&SessionEvent::error(err));
                    }
                }
                None => warn!("no transport handle to send on"),
            },
            Effect::ScheduleReconnect { delay } => {
                self.timer = Some(Box::pin(sleep(delay)));
            }
            Effect::CancelReconnect => {
                if self.timer.take().is_some() {
                    debug!("pending reconnect cancelled");
                }
            }
            Effect::Emit(event) => self.emit(&event),
        }
        None
    }

    fn open(&mut self, generation: u64) -> Option<Input> {
        // Only one live handle at a time.
        if let Some(mut stale) = self.handle.take() {
            stale.close();
        }

        match self.resolver.resolve() {
            Ok(endpoint) => {
                info!(endpoint = %endpoint, generation, "opening session connection");
                let sink = TransportSink::new(generation, self.notify_tx.clone());
                self.handle = Some(self.transport.open(&endpoint, sink));
                None
            }
            Err(error) => Some(Input::OpenFailed { generation, error }),
        }
    }

    fn emit(&self, event: &SessionEvent) {
        subscribers::emit(&self.subscribers, event);
    }

    fn publish(&self) {
        self.status.state.store(self.machine.state());
        self.status
            .attempt
            .store(self.machine.attempt(), Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.step(Input::Close);
        self.timer = None;
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        debug!("session driver stopped");
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
