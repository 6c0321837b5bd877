//! Session client handle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::driver::{Command, Driver, SharedStatus};
use super::events::{EventKind, SessionEvent};
use super::machine::SessionMachine;
use super::retry::RetryConfig;
use super::state::ConnectionState;
use super::subscribers::{SharedSubscribers, Subscribers, SubscriptionId};
use crate::endpoint::EndpointResolver;
use crate::error::LinkError;
use crate::transport::Transport;

#[cfg(feature = "websocket")]
use crate::config::LinkConfig;
#[cfg(feature = "websocket")]
use crate::transport::WsTransport;

/// A session client with automatic reconnection support.
///
/// Every method returns immediately. Outcomes, including failures, are
/// delivered to subscribers registered with [`SessionClient::on`].
///
/// Dropping the client has the same effect as [`SessionClient::dispose`]
/// without waiting for the driver to stop.
pub struct SessionClient {
    commands: mpsc::UnboundedSender<Command>,
    subscribers: SharedSubscribers,
    status: Arc<SharedStatus>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state())
            .field("attempt", &self.attempt())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client and start its driver task.
    ///
    /// The client starts `Disconnected`; call [`SessionClient::connect`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn create<T, R>(transport: T, resolver: R, retry: RetryConfig) -> Self
    where
        T: Transport,
        R: EndpointResolver,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let subscribers: SharedSubscribers = Arc::new(RwLock::new(Subscribers::new()));
        let status = Arc::new(SharedStatus::new());

        let driver = Driver::new(
            SessionMachine::new(retry),
            Arc::new(transport),
            Arc::new(resolver),
            Arc::clone(&subscribers),
            Arc::clone(&status),
            notify_tx,
        );
        let task = tokio::spawn(driver.run(command_rx, notify_rx));

        Self {
            commands,
            subscribers,
            status,
            task: Some(task),
        }
    }

    /// Create a WebSocket client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    #[cfg(feature = "websocket")]
    pub fn from_config(config: &LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let transport = WsTransport::new().with_connect_timeout(config.connect_timeout());
        Ok(Self::create(
            transport,
            config.resolver(),
            config.retry_config(),
        ))
    }

    /// Start connecting. No-op while connecting or connected.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Send a JSON payload.
    ///
    /// Dropped, and reported as an `error` event, unless connected.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        let command = match serde_json::to_string(payload) {
            Ok(text) => Command::Send(text),
            Err(e) => Command::Rejected(LinkError::Encode(e.to_string())),
        };
        self.command(command);
    }

    /// Close the connection without reconnecting.
    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// Close the connection and stop the driver task.
    pub async fn dispose(mut self) {
        self.command(Command::Dispose);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session driver ended abnormally");
            }
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers run on the driver task, in registration order, and must
    /// not block.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().on(kind, handler)
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().off(id)
    }

    /// Receive every event on a channel.
    ///
    /// Channel delivery follows the registered handlers. Dropping the
    /// receiver unregisters the channel.
    pub fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.subscribers.write().channel()
    }

    /// Number of live [`SessionClient::events`] channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.subscribers.read().channel_count()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state.load()
    }

    /// Consecutive failed attempts since the last successful connection.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.status.attempt.load(Ordering::SeqCst)
    }

    /// Check if the client is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("session driver has stopped; command ignored");
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Dispose);
        }
    }
}
