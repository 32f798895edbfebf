//! Ingestion adapter: explicit uploads and the passive intake watch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::watch::{DirectoryWatcher, PendingSlot, WatchEvent};
use privsentry_core::{is_redacted_output, Error, IngestionEvent, PrivSentryConfig, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    MonitoringStarted,
    AlreadyMonitoring,
    MonitoringStopped,
    NotMonitoring,
}

/// Response to start/stop monitoring calls.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub status: MonitorStatus,
    pub watched_directory: PathBuf,
    pub message: &'static str,
}

/// Result of polling the intake for work.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Event(IngestionEvent),
    NoFiles,
}

/// Owns the intake directory, its watcher, and the pending-event slot.
pub struct IngestionService {
    intake_dir: PathBuf,
    default_user_id: String,
    interval: Duration,
    pending: Arc<PendingSlot>,
    watcher: Mutex<Option<DirectoryWatcher>>,
}

impl IngestionService {
    pub fn new(intake_dir: impl Into<PathBuf>, default_user_id: impl Into<String>) -> Self {
        Self {
            intake_dir: intake_dir.into(),
            default_user_id: default_user_id.into(),
            interval: Duration::from_millis(500),
            pending: Arc::new(PendingSlot::new()),
            watcher: Mutex::new(None),
        }
    }

    pub fn from_config(config: &PrivSentryConfig) -> Self {
        Self::new(&config.data_paths.intake, &config.default_user_id)
            .with_interval(Duration::from_millis(config.watch_interval_ms))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn intake_dir(&self) -> &Path {
        &self.intake_dir
    }

    pub fn default_user_id(&self) -> &str {
        &self.default_user_id
    }

    /// Copy `source` into the intake directory and emit an ingestion event.
    pub fn upload(&self, source: &Path, user_id: Option<&str>) -> Result<IngestionEvent> {
        let filename = source
            .file_name()
            .ok_or_else(|| Error::MissingInput("source_path".into()))?;
        std::fs::create_dir_all(&self.intake_dir)?;
        let dest = self.intake_dir.join(filename);

        // Copying a file onto itself would truncate it
        let same_file = match (source.canonicalize(), dest.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            std::fs::copy(source, &dest)?;
        }

        let user_id = user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.default_user_id);
        info!("Ingested {} for user {}", dest.display(), user_id);
        Ok(IngestionEvent::new(dest, user_id))
    }

    pub fn start_monitoring(&self) -> Result<MonitorReport> {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return Ok(self.report(MonitorStatus::AlreadyMonitoring));
        }
        std::fs::create_dir_all(&self.intake_dir)?;
        *watcher = Some(DirectoryWatcher::spawn(
            self.intake_dir.clone(),
            self.interval,
            self.pending.clone(),
        )?);
        Ok(self.report(MonitorStatus::MonitoringStarted))
    }

    pub fn stop_monitoring(&self) -> MonitorReport {
        // Joins the watch thread
        match self.watcher.lock().take() {
            Some(_) => self.report(MonitorStatus::MonitoringStopped),
            None => self.report(MonitorStatus::NotMonitoring),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Consume the latest watch event, if one is pending.
    pub fn try_consume_latest(&self) -> Option<WatchEvent> {
        self.pending.take()
    }

    /// The pending watch event if fresh, else the newest file in the intake.
    pub fn poll(&self) -> Result<PollOutcome> {
        if !self.intake_dir.is_dir() {
            return Err(Error::FileNotFound(format!(
                "watched directory {}",
                self.intake_dir.display()
            )));
        }

        if let Some(event) = self.try_consume_latest() {
            return Ok(PollOutcome::Event(IngestionEvent::at(
                event.file_path,
                &self.default_user_id,
                event.timestamp,
            )));
        }

        match self.newest_file()? {
            Some(path) => {
                debug!("No pending watch event, using newest file {}", path.display());
                Ok(PollOutcome::Event(IngestionEvent::new(path, &self.default_user_id)))
            }
            None => Ok(PollOutcome::NoFiles),
        }
    }

    /// File with the most recent creation time (modification time where the
    /// platform does not record creation).
    fn newest_file(&self) -> Result<Option<PathBuf>> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.intake_dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() || is_redacted_output(&path) {
                continue;
            }
            let Ok(created) = meta.created().or_else(|_| meta.modified()) else {
                continue;
            };
            if newest.as_ref().map_or(true, |(t, _)| created > *t) {
                newest = Some((created, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    fn report(&self, status: MonitorStatus) -> MonitorReport {
        let message = match status {
            MonitorStatus::MonitoringStarted => "File monitoring is now active",
            MonitorStatus::AlreadyMonitoring => "File monitoring is already active",
            MonitorStatus::MonitoringStopped => "File monitoring has been stopped",
            MonitorStatus::NotMonitoring => "File monitoring was not active",
        };
        MonitorReport {
            status,
            watched_directory: self.intake_dir.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::WatchKind;
    use chrono::{DateTime, Utc};

    fn service() -> (IngestionService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let svc = IngestionService::new(dir.path().join("intake"), "user123")
            .with_interval(Duration::from_millis(10));
        std::fs::create_dir_all(svc.intake_dir()).unwrap();
        (svc, dir)
    }

    #[test]
    fn test_upload_copies_into_intake() {
        let (svc, dir) = service();
        let src = dir.path().join("resume.txt");
        std::fs::write(&src, "jane@example.com").unwrap();

        let ev = svc.upload(&src, Some("u1")).unwrap();
        assert_eq!(ev.event_type, "new_file_ingested");
        assert_eq!(ev.user_id, "u1");
        assert_eq!(ev.file_path, svc.intake_dir().join("resume.txt"));
        assert_eq!(std::fs::read_to_string(&ev.file_path).unwrap(), "jane@example.com");
        assert!(src.exists());
    }

    #[test]
    fn test_upload_defaults_user() {
        let (svc, dir) = service();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, "x").unwrap();
        assert_eq!(svc.upload(&src, None).unwrap().user_id, "user123");
    }

    #[test]
    fn test_upload_unreadable_source_fails() {
        let (svc, dir) = service();
        let err = svc.upload(&dir.path().join("missing.txt"), None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_upload_file_already_in_intake() {
        let (svc, _dir) = service();
        let path = svc.intake_dir().join("inplace.txt");
        std::fs::write(&path, "keep me").unwrap();
        svc.upload(&path, None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_monitoring_idempotent() {
        let (svc, _dir) = service();
        assert_eq!(svc.stop_monitoring().status, MonitorStatus::NotMonitoring);
        assert_eq!(svc.start_monitoring().unwrap().status, MonitorStatus::MonitoringStarted);
        assert_eq!(svc.start_monitoring().unwrap().status, MonitorStatus::AlreadyMonitoring);
        assert!(svc.is_monitoring());
        assert_eq!(svc.stop_monitoring().status, MonitorStatus::MonitoringStopped);
        assert_eq!(svc.stop_monitoring().status, MonitorStatus::NotMonitoring);
        assert!(!svc.is_monitoring());
    }

    #[test]
    fn test_poll_empty_intake() {
        let (svc, _dir) = service();
        assert_eq!(svc.poll().unwrap(), PollOutcome::NoFiles);
    }

    #[test]
    fn test_poll_missing_intake_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = IngestionService::new(dir.path().join("absent"), "user123");
        assert!(svc.poll().is_err());
    }

    #[test]
    fn test_poll_falls_back_to_newest_file() {
        let (svc, _dir) = service();
        std::fs::write(svc.intake_dir().join("only.txt"), "x").unwrap();
        std::fs::write(svc.intake_dir().join("only_redacted.txt"), "x").unwrap();
        match svc.poll().unwrap() {
            PollOutcome::Event(ev) => {
                assert_eq!(ev.file_path, svc.intake_dir().join("only.txt"));
                assert_eq!(ev.user_id, "user123");
            }
            PollOutcome::NoFiles => panic!("expected an event"),
        }
    }

    #[test]
    fn test_poll_prefers_pending_event_and_consumes_it() {
        let (svc, _dir) = service();
        let watched = svc.intake_dir().join("watched.txt");
        std::fs::write(&watched, "x").unwrap();
        let at = DateTime::<Utc>::from(SystemTime::UNIX_EPOCH);
        svc.pending.put(WatchEvent {
            event_type: WatchKind::FileModified,
            file_path: watched.clone(),
            timestamp: at,
        });

        match svc.poll().unwrap() {
            PollOutcome::Event(ev) => {
                assert_eq!(ev.file_path, watched);
                assert_eq!(ev.timestamp, at);
            }
            PollOutcome::NoFiles => panic!("expected an event"),
        }
        assert!(svc.try_consume_latest().is_none());
    }
}
