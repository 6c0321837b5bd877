//! # vino-cli
//!
//! Operator tool for the Vino session client.
//!
//! Provides commands for:
//! - Connecting to a session server and watching its events
//! - Sending messages typed on stdin
//! - Writing and inspecting configuration
//!
//! ```text
//! ┌───────────┐   vino-link client    ┌────────────────┐
//! │  vino-cli │◄─────────────────────►│ session server │
//! └───────────┘     (WebSocket)       └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod output;

pub use cli::{Cli, Commands, ConnectArgs, Format, SourceArgs};
pub use output::{EventRecord, OutputFormat};
