//! Output formatting for session events.
//!
//! Supports text (human-readable) and JSON-lines output formats.

use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use vino_link::SessionEvent;

use crate::cli::Format;

/// A session event stamped with the time it was printed.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
    /// Event kind, e.g. `connected`.
    pub event: String,
    /// Event-specific fields.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl EventRecord {
    /// Build a record for `event` observed at `timestamp`.
    #[must_use]
    pub fn new(event: &SessionEvent, timestamp: DateTime<Utc>) -> Self {
        let detail = match event {
            SessionEvent::Connected => Value::Null,
            SessionEvent::Disconnected {
                reason,
                intentional,
            } => json!({ "reason": reason, "intentional": intentional }),
            SessionEvent::Reconnecting { attempt, delay } => json!({
                "attempt": attempt,
                "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            }),
            SessionEvent::Message(value) => value.clone(),
            SessionEvent::Error(err) => json!({ "error": err.to_string() }),
            SessionEvent::Exhausted { attempts } => json!({ "attempts": attempts }),
        };

        Self {
            timestamp,
            event: event.kind().to_string(),
            detail,
        }
    }

    fn summary(&self) -> String {
        match &self.detail {
            Value::Null => String::new(),
            Value::Object(map) if self.event != "message" => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect::<Vec<_>>()
                .join(" "),
            other => other.to_string(),
        }
    }
}

/// Writes event records in the selected format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Write one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_record<W: Write>(&self, writer: &mut W, record: &EventRecord) -> io::Result<()> {
        match self.format {
            Format::Json => {
                serde_json::to_writer(&mut *writer, record)?;
                writeln!(writer)?;
            }
            Format::Text => {
                let time = record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
                let summary = record.summary();
                if summary.is_empty() {
                    writeln!(writer, "{time} {}", record.event)?;
                } else {
                    writeln!(writer, "{time} {:<12} {summary}", record.event)?;
                }
            }
        }
        writer.flush()
    }

    /// Write a line of plain output.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_line<W: Write>(&self, writer: &mut W, key: &str, value: &str) -> io::Result<()> {
        match self.format {
            Format::Json => {
                serde_json::to_writer(&mut *writer, &json!({ key: value }))?;
                writeln!(writer)
            }
            Format::Text => writeln!(writer, "{value}"),
        }
    }
}
