//! Audit sinks: the analytical store (primary) and the durable JSONL log (fallback).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::entry::AuditEntry;
use privsentry_core::config::validate_identifier;
use privsentry_core::{Error, Result};

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Append one entry atomically.
    fn insert(&self, entry: &AuditEntry) -> Result<()>;

    /// Every readable entry, in write order.
    fn entries(&self) -> Result<Vec<AuditEntry>>;
}

/// Newline-delimited JSON log, one entry per line.
pub struct JsonlAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl AuditSink for JsonlAuditLog {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn insert(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write per entry: concurrent appenders never interleave lines
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        // Raw bytes: a torn or non-UTF-8 line must not poison the whole log
        let raw = std::fs::read(&self.path)?;
        let mut skipped = 0usize;
        let entries: Vec<AuditEntry> = raw
            .split(|b| *b == b'\n')
            .filter(|l| !l.iter().all(u8::is_ascii_whitespace))
            .filter_map(|l| match serde_json::from_slice(l) {
                Ok(entry) => Some(entry),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        if skipped > 0 {
            debug!("Skipped {} malformed audit lines in {}", skipped, self.path.display());
        }
        Ok(entries)
    }
}

/// Analytical store: structured columns plus the full entry as JSON.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteAuditSink {
    pub fn open(db_path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let table = validate_identifier(table)?.to_string();
        let conn = Connection::open(db_path.as_ref()).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                file_path TEXT NOT NULL,
                user_id TEXT NOT NULL,
                processing_status TEXT NOT NULL,
                compliance_status TEXT NOT NULL,
                entry TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_user ON {table}(user_id);"
        ))
        .map_err(|e| Error::Database(e.to_string()))?;
        info!("Analytical audit store opened: {}", db_path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }
}

impl AuditSink for SqliteAuditSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, entry: &AuditEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (event_type, timestamp, recorded_at, file_path, user_id,
                    processing_status, compliance_status, entry)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.table
            ),
            params![
                entry.event_type,
                entry.timestamp.to_rfc3339(),
                entry.recorded_at.to_rfc3339(),
                entry.file_path.display().to_string(),
                entry.user_id,
                entry.processing_status.as_str(),
                entry.compliance_status().as_str(),
                json,
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT entry FROM {} ORDER BY id", self.table))
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| Error::Database(e.to_string()))?;
            match serde_json::from_str(&raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!("Skipping malformed analytical row: {}", e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use privsentry_core::PipelineEvent;

    fn entry(user: &str) -> AuditEntry {
        let mut ev = PipelineEvent::new("intake/a.txt", user);
        ev.fail("incomplete");
        AuditEntry::from_event(&ev, Utc::now())
    }

    #[test]
    fn test_jsonl_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("audit_log.jsonl"));
        assert!(!log.exists());
        assert!(log.entries().unwrap().is_empty());

        log.insert(&entry("u1")).unwrap();
        log.insert(&entry("u2")).unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "u1");
        assert_eq!(entries[1].user_id, "u2");
    }

    #[test]
    fn test_jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_log.jsonl");
        let log = JsonlAuditLog::new(&path);
        log.insert(&entry("u1")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file, "{{\"event_type\":\"x\"}}").unwrap();
        log.insert(&entry("u3")).unwrap();

        let users: Vec<String> = log.entries().unwrap().into_iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec!["u1", "u3"]);
    }

    #[test]
    fn test_jsonl_skips_non_utf8_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_log.jsonl");
        let log = JsonlAuditLog::new(&path);
        log.insert(&entry("u1")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        log.insert(&entry("u2")).unwrap();

        let users: Vec<String> = log.entries().unwrap().into_iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec!["u1", "u2"]);
    }

    #[test]
    fn test_sqlite_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteAuditSink::open(dir.path().join("analytics.db"), "privacy_audit_audit_events")
            .unwrap();
        let e = entry("u1");
        sink.insert(&e).unwrap();
        assert_eq!(sink.entries().unwrap(), vec![e]);
    }
}
