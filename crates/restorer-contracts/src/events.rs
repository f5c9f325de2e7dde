use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::session::SessionPhase;

/// Everything the session records into `events.jsonl`.
///
/// The variant name becomes the `type` field; `session_id` and `ts` are
/// stamped by [`EventWriter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        client: String,
    },
    ImageStaged {
        path: String,
        file_name: String,
        mime_type: String,
        size_bytes: u64,
        width: Option<u32>,
        height: Option<u32>,
        oversized: bool,
        abandoned_in_flight: bool,
    },
    ImageRejected {
        path: String,
        error: String,
    },
    RestoreStarted {
        attempt: u64,
        client: String,
        mime_type: String,
        size_bytes: u64,
    },
    RestoreRejected {
        error: String,
    },
    RestoreSucceeded {
        attempt: u64,
        mime_type: String,
        size_bytes: u64,
        width: Option<u32>,
        height: Option<u32>,
        download_name: String,
    },
    RestoreFailed {
        attempt: u64,
        outcome: &'static str,
        error: Option<String>,
    },
    /// Outcome of an attempt whose image was replaced before it settled.
    RestoreDiscarded {
        attempt: u64,
        outcome: &'static str,
    },
    RestoredImageSaved {
        path: String,
        mime_type: String,
        size_bytes: u64,
    },
    SessionFinished {
        attempts: u64,
        phase: SessionPhase,
        abandoned_in_flight: bool,
    },
}

/// Append-only writer for the session's `events.jsonl`, one compact JSON
/// object per line.
///
/// Clones share the same file and lock, so a worker thread can report into
/// the same log as the UI loop.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Appends `event` and returns the row as written.
    pub fn record(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let mut row = serde_json::to_value(event).context("failed to encode session event")?;
        let Value::Object(fields) = &mut row else {
            bail!("session event did not encode to a JSON object");
        };
        fields.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        fields.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        let line = serde_json::to_string(&row)?;

        let path = &self.inner.path;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        writeln!(file, "{line}")?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::DateTime;

    use super::*;

    fn types_in(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
        Ok(fs::read_to_string(path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    #[test]
    fn record_writes_tagged_row_with_session_stamp() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let written = writer.record(&SessionEvent::RestoreFailed {
            attempt: 2,
            outcome: "declined",
            error: Some("Restoration failed: no".to_string()),
        })?;

        let content = fs::read_to_string(&path)?;
        let parsed: Value = serde_json::from_str(content.lines().next().unwrap_or(""))?;
        assert_eq!(parsed, written);
        assert_eq!(parsed["type"], "restore_failed");
        assert_eq!(parsed["session_id"], "session-123");
        assert_eq!(parsed["attempt"], 2);
        assert_eq!(parsed["outcome"], "declined");
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn session_phase_is_recorded_in_snake_case() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let written = writer.record(&SessionEvent::SessionFinished {
            attempts: 1,
            phase: SessionPhase::PreviewingWithError,
            abandoned_in_flight: false,
        })?;
        assert_eq!(written["type"], "session_finished");
        assert_eq!(written["phase"], "previewing_with_error");
        Ok(())
    }

    #[test]
    fn clones_append_to_the_same_file_from_other_threads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.record(&SessionEvent::SessionStarted {
            client: "gemini".to_string(),
        })?;
        let worker = writer.clone();
        thread::spawn(move || {
            worker.record(&SessionEvent::RestoreDiscarded {
                attempt: 1,
                outcome: "restored",
            })
        })
        .join()
        .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;

        assert_eq!(
            types_in(&path)?,
            vec!["session_started".to_string(), "restore_discarded".to_string()]
        );
        Ok(())
    }
}
