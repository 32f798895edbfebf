//! Passive intake watch: a polling observer feeding a single pending-event slot.
//!
//! The slot holds at most one event: a newer event overwrites an unconsumed one,
//! and reading it clears it so the same event is never processed twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use privsentry_core::is_redacted_output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    FileCreated,
    FileModified,
}

/// A create/modify observation in the intake directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchEvent {
    pub event_type: WatchKind,
    pub file_path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Single-writer/single-reader cell holding the latest unconsumed event.
#[derive(Debug, Default)]
pub struct PendingSlot {
    inner: Mutex<Option<WatchEvent>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `event`, returning the unconsumed event it replaced.
    pub fn put(&self, event: WatchEvent) -> Option<WatchEvent> {
        self.inner.lock().replace(event)
    }

    /// Consume the pending event, leaving the slot empty.
    pub fn take(&self) -> Option<WatchEvent> {
        self.inner.lock().take()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.inner.lock().is_some()
    }
}

type Snapshot = HashMap<PathBuf, SystemTime>;

/// Background observer thread. Dropping it stops and joins the thread.
pub(crate) struct DirectoryWatcher {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub(crate) fn spawn(
        dir: PathBuf,
        interval: Duration,
        slot: Arc<PendingSlot>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let mut known = snapshot(&dir);

        let handle = thread::Builder::new()
            .name("intake-watch".to_string())
            .spawn(move || {
                info!("Intake watch started: {}", dir.display());
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let current = snapshot(&dir);
                    if let Some(event) = latest_change(&known, &current) {
                        debug!("Intake {:?}: {}", event.event_type, event.file_path.display());
                        if let Some(dropped) = slot.put(event) {
                            debug!("Overwrote unconsumed event for {}", dropped.file_path.display());
                        }
                    }
                    known = current;
                }
                info!("Intake watch stopped: {}", dir.display());
            })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Regular files in `dir` (non-recursive) with their modification times.
fn snapshot(dir: &Path) -> Snapshot {
    let mut files = Snapshot::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if is_redacted_output(&path) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    if let Ok(modified) = meta.modified() {
                        files.insert(path, modified);
                    }
                }
            }
        }
    }
    files
}

/// The most recent create or modify between two snapshots, if any.
fn latest_change(before: &Snapshot, after: &Snapshot) -> Option<WatchEvent> {
    after
        .iter()
        .filter_map(|(path, modified)| {
            let kind = match before.get(path) {
                None => WatchKind::FileCreated,
                Some(prev) if prev != modified => WatchKind::FileModified,
                Some(_) => return None,
            };
            Some((kind, path, *modified))
        })
        .max_by_key(|(_, _, modified)| *modified)
        .map(|(kind, path, modified)| WatchEvent {
            event_type: kind,
            file_path: path.clone(),
            timestamp: DateTime::<Utc>::from(modified),
        })
}
