//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vino_link::RuntimeEnv;

/// Vino session client - connect to a roleplay session server.
#[derive(Parser, Debug, Clone)]
#[command(name = "vino-link")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect to a session server and print its events.
    ///
    /// Each line read from stdin is sent as a message: valid JSON is sent
    /// as-is, anything else as a JSON string.
    Connect(ConnectArgs),

    /// Write a default configuration file.
    InitConfig {
        /// Path to write config.
        #[arg(short, long, default_value = "vino-link.toml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the endpoint the configuration selects.
    Endpoint(SourceArgs),
}

/// Where configuration comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to a TOML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Runtime environment (production or development).
    #[arg(short, long, env = "VINO_ENV")]
    pub env: Option<RuntimeEnv>,

    /// Use this URL instead of the configured endpoint.
    #[arg(short, long)]
    pub url: Option<String>,
}

/// Arguments for the connect command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Configuration source.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Reconnection attempts before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Delay before the first reconnection attempt, in milliseconds.
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Ceiling for the reconnection delay, in milliseconds.
    #[arg(long)]
    pub max_delay_ms: Option<u64>,
}
