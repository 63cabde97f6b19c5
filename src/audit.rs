//! Append-only audit trail.
//!
//! An in-memory audit vec doesn't survive a process restart, so entries are
//! appended to `audit.jsonl` on disk instead (one JSON object per line), and
//! mirrored through `tracing` so operators following logs see the same
//! events live.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            details,
        }
    }
}

/// Writes `AuditEvent`s to `audit.jsonl`, one JSON object per line.
///
/// All writes are serialized behind a `Mutex` so concurrent tool executions
/// don't interleave partial lines.
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn record(&self, event_type: &str, details: serde_json::Value) -> std::io::Result<AuditEvent> {
        let event = AuditEvent::new(event_type, details);
        self.append(&event)?;
        tracing::info!(
            audit_id = %event.id,
            audit_type = %event.event_type,
            details = %event.details,
            "audit event"
        );
        Ok(event)
    }

    fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read the most recent `limit` entries, oldest first (`/audit [n]`).
    pub fn tail(&self, limit: usize) -> std::io::Result<Vec<AuditEvent>> {
        let _guard = self.lock.lock().unwrap();
        read_tail(&self.path, limit)
    }
}

fn read_tail(path: &Path, limit: usize) -> std::io::Result<Vec<AuditEvent>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut events: Vec<AuditEvent> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    if events.len() > limit {
        events = events.split_off(events.len() - limit);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn record_appends_and_tail_reads_back() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        log.record("tool_executed", json!({"tool": "read_file"})).unwrap();
        log.record("tool_executed", json!({"tool": "write_file"})).unwrap();

        let tail = log.tail(10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event_type, "tool_executed");
    }

    #[test]
    fn tail_respects_limit() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        for i in 0..5 {
            log.record("event", json!({"i": i})).unwrap();
        }
        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].details["i"], 3);
        assert_eq!(tail[1].details["i"], 4);
    }

    #[test]
    fn tail_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nope.jsonl"));
        assert!(log.tail(10).unwrap().is_empty());
    }

    #[test]
    fn survives_process_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::new(&path);
            log.record("wake", json!({})).unwrap();
        }
        let log = AuditLog::new(&path);
        assert_eq!(log.tail(10).unwrap().len(), 1);
    }
}
