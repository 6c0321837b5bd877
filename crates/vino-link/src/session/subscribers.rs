//! Subscriber registry.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::events::{EventKind, SessionEvent};

/// A registered event callback.
pub type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Identifies one registration, for [`Subscribers::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered handlers per event kind, plus channels that receive every event.
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    channels: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Subscribers")
            .field("handlers", &counts)
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl Subscribers {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers for the same kind run in registration order.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Open a channel that receives every event.
    ///
    /// The channel is forgotten once its receiver is dropped.
    pub fn channel(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.prune_channels();
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.push(tx);
        rx
    }

    /// Number of channels still registered.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn prune_channels(&mut self) {
        self.channels.retain(|tx| !tx.is_closed());
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

/// Registry shared between the client handle and its driver.
pub(crate) type SharedSubscribers = Arc<RwLock<Subscribers>>;

/// Invoke every handler registered for the event's kind, then forward the
/// event to every open channel.
///
/// The registry lock is released before handlers run, so a handler may
/// subscribe or unsubscribe. A panicking handler is logged and skipped.
/// Channels whose receiver is gone are removed.
/// Returns the number of handlers that panicked.
pub(crate) fn emit(subscribers: &RwLock<Subscribers>, event: &SessionEvent) -> usize {
    let (handlers, channels) = {
        let registry = subscribers.read();
        (registry.handlers_for(event.kind()), registry.channels.clone())
    };
    let panicked = dispatch(&handlers, event);

    let mut dead = 0;
    for tx in &channels {
        if tx.send(event.clone()).is_err() {
            dead += 1;
        }
    }
    if dead > 0 {
        tracing::trace!(dead, "dropping closed event channels");
        subscribers.write().prune_channels();
    }

    panicked
}

fn dispatch(handlers: &[Handler], event: &SessionEvent) -> usize {
    let mut panicked = 0;
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            panicked += 1;
            tracing::error!(kind = %event.kind(), "event handler panicked");
        }
    }
    panicked
}
