//! CLI command implementations.

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use vino_link::endpoint::validate_endpoint;
use vino_link::{LinkConfig, RuntimeEnv, SessionClient, SessionEvent};

use crate::cli::{ConnectArgs, SourceArgs};
use crate::output::{EventRecord, OutputFormat};

/// Load configuration and apply the environment and URL overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded.
pub fn load_config(source: &SourceArgs) -> anyhow::Result<LinkConfig> {
    let mut config = match &source.config {
        Some(path) => LinkConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LinkConfig::default(),
    };

    if let Some(env) = source.env {
        config.environment = env;
    }

    if let Some(url) = &source.url {
        match config.environment {
            RuntimeEnv::Production => config.endpoints.production = Some(url.clone()),
            RuntimeEnv::Development => url.clone_into(&mut config.endpoints.development),
        }
    }

    Ok(config)
}

/// Configuration for the connect command, with retry overrides applied.
///
/// # Errors
///
/// Returns an error if loading fails or the result is invalid.
pub fn connect_config(args: &ConnectArgs) -> anyhow::Result<LinkConfig> {
    let mut config = load_config(&args.source)?;

    if let Some(max_attempts) = args.max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    if let Some(base_delay_ms) = args.base_delay_ms {
        config.retry.base_delay_ms = base_delay_ms;
    }
    if let Some(max_delay_ms) = args.max_delay_ms {
        config.retry.max_delay_ms = max_delay_ms;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Payload for a line typed on stdin.
///
/// Valid JSON is sent as-is; anything else is sent as a JSON string.
#[must_use]
pub fn payload_from_line(line: &str) -> Value {
    serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
}

/// Connect and print events until interrupted or retries run out.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, output fails, or the
/// client gives up reconnecting.
pub async fn connect<W: Write>(
    args: &ConnectArgs,
    format: OutputFormat,
    out: &mut W,
) -> anyhow::Result<()> {
    let config = connect_config(args)?;
    let client = SessionClient::from_config(&config).context("failed to create client")?;
    let mut events = client.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!(
        endpoint = %config.endpoint()?,
        environment = %config.environment,
        max_attempts = config.retry.max_attempts,
        "connecting"
    );
    client.connect();

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                format.write_record(out, &EventRecord::new(&event, Utc::now()))?;
                if let SessionEvent::Exhausted { attempts } = event {
                    break Err(anyhow!("gave up after {attempts} reconnection attempts"));
                }
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        client.send(&payload_from_line(line));
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin");
                    stdin_open = false;
                }
            },

            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for interrupt");
                }
                info!("interrupted, closing session");
                break Ok(());
            }
        }
    };

    client.dispose().await;
    while let Ok(event) = events.try_recv() {
        format.write_record(out, &EventRecord::new(&event, Utc::now()))?;
    }

    outcome
}

/// Write a default configuration file.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is not set, or if
/// writing fails.
pub fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }

    LinkConfig::default()
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(path = %output.display(), "wrote default configuration");
    Ok(())
}

/// Print the endpoint the configuration selects.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the endpoint
/// is not a WebSocket URL.
pub fn endpoint<W: Write>(
    source: &SourceArgs,
    format: OutputFormat,
    out: &mut W,
) -> anyhow::Result<()> {
    let config = load_config(source)?;
    let url = validate_endpoint(config.endpoint()?)?;
    format.write_line(out, "endpoint", url.as_str())?;
    Ok(())
}
