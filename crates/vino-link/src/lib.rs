//! # vino-link
//!
//! Real-time session client for the Vino sales-roleplay trainer.
//!
//! The client keeps one full-duplex connection to a session server alive,
//! surfaces inbound JSON messages as typed events and recovers lost
//! connections with exponential backoff:
//!
//! - [`SessionClient`] - Owning handle: `connect`, `send`, `close`, subscriptions
//! - [`SessionMachine`] - I/O-free state machine driving every transition
//! - [`RetryPolicy`] - Attempt counting and backoff delays
//! - [`Transport`] - Pluggable message channel ([`WsTransport`] by default)
//! - [`LinkConfig`] - TOML configuration for endpoints, retry and transport
//!
//! ```text
//!  connect/send/close        ┌──────────────┐   open/send/close   ┌───────────┐
//! ─────────────────────────►│ driver task  │────────────────────►│ transport │
//!  on(kind, handler) ◄──────│  + machine   │◄────────────────────│           │
//!        events              └──────────────┘  opened/message/... └───────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod transport;

pub use config::LinkConfig;
pub use endpoint::{EndpointResolver, Endpoints, EnvironmentResolver, FixedEndpoint, RuntimeEnv};
pub use error::LinkError;
pub use session::{
    ConnectionState, EventKind, RetryConfig, RetryPolicy, SessionClient, SessionEvent,
    SessionMachine, SubscriptionId,
};
pub use transport::{Transport, TransportEvent, TransportHandle, TransportSink};

#[cfg(feature = "websocket")]
pub use transport::WsTransport;
