//! The append-only audit log: one JSON object per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, ResultExt, Snafu};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not open audit log {}", filename.display()))]
    OpenLog {
        filename: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not serialize audit event"))]
    SerializeEvent {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not append to the audit log"))]
    AppendEvent {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome recorded with an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What kind of event this is.
    #[serde(rename = "eventType")]
    pub event_type: String,
    /// Whether the audited action succeeded.
    pub outcome: AuditOutcome,
    /// The acting user or application entity.
    pub user: String,
    /// Where the action originated (address or AE title).
    pub source: String,
    /// Free-form details of the event.
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Build an event with the current timestamp.
    pub fn new(
        event_type: impl Into<String>,
        outcome: AuditOutcome,
        user: impl Into<String>,
        source: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            outcome,
            user: user.into(),
            source: source.into(),
            details,
        }
    }
}

/// An append-only JSONL audit log over an arbitrary writer.
pub struct AuditLog<W: Write = File> {
    sink: Mutex<W>,
}

impl AuditLog<File> {
    /// Open (or create) an audit log file for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(OpenLogSnafu { filename: path })?;
        Ok(AuditLog {
            sink: Mutex::new(file),
        })
    }
}

impl<W: Write> AuditLog<W> {
    /// Create an audit log over the given writer.
    pub fn from_writer(sink: W) -> Self {
        AuditLog {
            sink: Mutex::new(sink),
        }
    }

    /// Append one event as a single JSON line.
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event).context(SerializeEventSnafu)?;
        line.push(b'\n');
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        sink.write_all(&line).context(AppendEventSnafu)?;
        sink.flush().context(AppendEventSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str) -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            outcome: AuditOutcome::Success,
            user: "MAYAM".to_string(),
            source: "10.0.0.2".to_string(),
            details: serde_json::json!({ "sopInstanceUid": "1.2.3" }),
        }
    }

    #[test]
    fn one_json_object_per_line() {
        let mut buffer = Vec::new();
        {
            let log = AuditLog::from_writer(&mut buffer);
            log.append(&event("instance-stored")).unwrap();
            log.append(&event("association-accepted")).unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["timestamp"].is_string());
            assert!(value["eventType"].is_string());
            assert_eq!(value["outcome"], "success");
            assert_eq!(value["user"], "MAYAM");
        }
    }

    #[test]
    fn append_to_file_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(&event("a")).unwrap();
        }
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(&event("b")).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
