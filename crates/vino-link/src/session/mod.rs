//! Session connection client.
//!
//! Manages the connection between the trainer and a session server,
//! including automatic reconnection with exponential backoff.

mod client;
mod driver;
mod events;
mod machine;
mod retry;
mod state;
mod subscribers;

pub use client::SessionClient;
pub use events::{EventKind, SessionEvent};
pub use machine::{Effect, Input, SessionMachine};
pub use retry::{RetryConfig, RetryPolicy};
pub use state::{AtomicConnectionState, ConnectionState};
pub use subscribers::{Handler, Subscribers, SubscriptionId};
