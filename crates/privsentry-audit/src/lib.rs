//! PrivSentry Audit: durable run records, compliance reports, CSV export.

pub mod entry;
pub mod export;
pub mod report;
pub mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use privsentry_core::{Fallback, PipelineEvent, PrivSentryConfig, Result, Tier};

pub use entry::{AuditEntry, ComplianceStatus};
pub use export::{write_csv, CSV_COLUMNS};
pub use report::{ComplianceReport, OverallStatus, ReportFilter, ReportPeriod};
pub use sink::{AuditSink, JsonlAuditLog, SqliteAuditSink};

/// Result of recording one run.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReceipt {
    pub audit_logged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_entry: Option<AuditEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportReceipt {
    pub report_generated: bool,
    pub report_file: PathBuf,
    pub compliance_report: ComplianceReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    pub entries_exported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            exported: false,
            output_file: None,
            entries_exported: 0,
            error: Some(error.into()),
        }
    }
}

/// Audit stage: the analytical store backed by the local JSONL log.
pub struct AuditTrail {
    sinks: Fallback<dyn AuditSink>,
    log: Arc<JsonlAuditLog>,
    report_file: PathBuf,
    export_file: PathBuf,
    recent_entries: usize,
}

impl AuditTrail {
    pub fn new(
        primary: Option<Arc<dyn AuditSink>>,
        log: Arc<JsonlAuditLog>,
        report_file: impl Into<PathBuf>,
        export_file: impl Into<PathBuf>,
    ) -> Self {
        let secondary: Arc<dyn AuditSink> = log.clone();
        Self {
            sinks: Fallback::new("audit", primary, secondary),
            log,
            report_file: report_file.into(),
            export_file: export_file.into(),
            recent_entries: 10,
        }
    }

    /// Wire the sinks from configuration. A misconfigured analytical store
    /// leaves the JSONL log as the only sink.
    pub fn from_config(config: &PrivSentryConfig) -> Self {
        let paths = &config.data_paths;
        let primary: Option<Arc<dyn AuditSink>> = match config.analytics_table() {
            Ok(table) => match SqliteAuditSink::open(&paths.analytics_db, &table) {
                Ok(sink) => Some(Arc::new(sink)),
                Err(e) => {
                    warn!("Analytical store unavailable: {}. Using local log only.", e);
                    None
                }
            },
            Err(e) => {
                info!("Analytical store disabled ({}). Using local log.", e);
                None
            }
        };
        Self::new(
            primary,
            Arc::new(JsonlAuditLog::new(&paths.audit_log)),
            &paths.report_file,
            &paths.export_file,
        )
        .with_recent_entries(config.recent_entries)
    }

    pub fn with_recent_entries(mut self, n: usize) -> Self {
        self.recent_entries = n;
        self
    }

    pub fn sinks(&self) -> &Fallback<dyn AuditSink> {
        &self.sinks
    }

    pub fn log(&self) -> &JsonlAuditLog {
        &self.log
    }

    /// Append an entry for the run's terminal state.
    pub fn record(&self, event: &PipelineEvent) -> AuditReceipt {
        let entry = AuditEntry::from_event(event, Utc::now());
        match self.sinks.run(|sink| sink.insert(&entry)) {
            Ok(((), tier)) => {
                info!(
                    "Audit recorded for {} (user {}): {} via {:?}",
                    entry.file_path.display(),
                    entry.user_id,
                    entry.compliance_status().as_str(),
                    tier
                );
                AuditReceipt {
                    audit_logged: true,
                    audit_entry: Some(entry),
                    tier: Some(tier),
                    message: "Audit event recorded".into(),
                    error: None,
                }
            }
            Err(e) => {
                error!("Audit record lost for {}: {}", entry.file_path.display(), e);
                AuditReceipt {
                    audit_logged: false,
                    audit_entry: Some(entry),
                    tier: None,
                    message: "Failed to record audit event".into(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Durable history: analytical store and local log merged by record time.
    pub fn history(&self) -> Result<Vec<AuditEntry>> {
        let mut entries = match self.sinks.primary() {
            Some(primary) => primary.entries().unwrap_or_else(|e| {
                warn!("Analytical store read failed: {}. Reading local log only.", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        entries.extend(self.log.entries()?);
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }

    /// Build the report, overwrite the snapshot file, and return both.
    pub fn generate_report(&self, filter: &ReportFilter) -> Result<ReportReceipt> {
        let history = self.history()?;
        let report = ComplianceReport::build(&history, filter, Utc::now(), self.recent_entries);

        if let Some(parent) = self.report_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.report_file, serde_json::to_vec_pretty(&report)?)?;
        info!(
            "Compliance report: {} runs, {}% compliant",
            report.summary.total_files_processed, report.summary.compliance_rate
        );

        Ok(ReportReceipt {
            report_generated: true,
            report_file: self.report_file.clone(),
            compliance_report: report,
        })
    }

    /// Export the full history as CSV to `output` (default export file).
    pub fn export_csv(&self, output: Option<&Path>) -> ExportOutcome {
        let entries = match self.history() {
            Ok(entries) => entries,
            Err(e) => return ExportOutcome::failed(e.to_string()),
        };
        if entries.is_empty() {
            return ExportOutcome::failed(if self.log.exists() {
                "No audit entries found"
            } else {
                "No audit log file found"
            });
        }

        let output = output.unwrap_or(self.export_file.as_path());
        match write_csv(&entries, output) {
            Ok(count) => {
                info!("Exported {} audit entries to {}", count, output.display());
                ExportOutcome {
                    exported: true,
                    output_file: Some(output.to_path_buf()),
                    entries_exported: count,
                    error: None,
                }
            }
            Err(e) => ExportOutcome::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privsentry_core::{Error, PiiType, PiiTypeSet};

    struct Unreachable;

    impl AuditSink for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn insert(&self, _: &AuditEntry) -> Result<()> {
            Err(Error::Unavailable("analytical store offline".into()))
        }

        fn entries(&self) -> Result<Vec<AuditEntry>> {
            Err(Error::Unavailable("analytical store offline".into()))
        }
    }

    fn trail(dir: &Path, primary: Option<Arc<dyn AuditSink>>) -> AuditTrail {
        AuditTrail::new(
            primary,
            Arc::new(JsonlAuditLog::new(dir.join("audit_log.jsonl"))),
            dir.join("compliance_report.json"),
            dir.join("audit_export.csv"),
        )
    }

    fn detected_run(user: &str) -> PipelineEvent {
        let mut ev = PipelineEvent::new("intake/a.txt", user);
        let findings: PiiTypeSet = [PiiType::UsSsn].into();
        ev.record_detection(findings).unwrap();
        ev
    }

    #[test]
    fn test_fallback_write_is_counted_in_report() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path(), Some(Arc::new(Unreachable)));

        let receipt = trail.record(&detected_run("u2"));
        assert!(receipt.audit_logged);
        assert_eq!(receipt.tier, Some(Tier::Fallback));
        assert!(trail.log().exists());

        let report = trail.generate_report(&ReportFilter::default()).unwrap();
        assert_eq!(report.compliance_report.summary.total_files_processed, 1);
        assert_eq!(report.compliance_report.summary.non_compliant_files, 1);
        assert!(dir.path().join("compliance_report.json").is_file());
    }

    #[test]
    fn test_empty_report_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = trail(dir.path(), None)
            .generate_report(&ReportFilter::default())
            .unwrap();
        assert!(receipt.report_generated);
        assert_eq!(receipt.compliance_report.summary.compliance_rate, 0.0);
    }

    #[test]
    fn test_history_merges_primary_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite: Arc<dyn AuditSink> =
            Arc::new(SqliteAuditSink::open(dir.path().join("analytics.db"), "audit").unwrap());

        // First run lands in the log while the store is offline
        trail(dir.path(), Some(Arc::new(Unreachable))).record(&detected_run("early"));
        let trail = trail(dir.path(), Some(sqlite));
        let receipt = trail.record(&detected_run("late"));
        assert_eq!(receipt.tier, Some(Tier::Primary));

        let users: Vec<String> = trail.history().unwrap().into_iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec!["early", "late"]);
    }

    #[test]
    fn test_export_without_log_fails_explicitly() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = trail(dir.path(), None).export_csv(None);
        assert!(!outcome.exported);
        assert_eq!(outcome.error.as_deref(), Some("No audit log file found"));
        assert!(!dir.path().join("audit_export.csv").exists());
    }

    #[test]
    fn test_export_empty_log_fails_explicitly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("audit_log.jsonl"), "garbage\n").unwrap();
        let outcome = trail(dir.path(), None).export_csv(None);
        assert!(!outcome.exported);
        assert_eq!(outcome.error.as_deref(), Some("No audit entries found"));
    }

    #[test]
    fn test_corrupt_log_line_does_not_abort_report_or_export() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path(), None);
        trail.record(&detected_run("u1"));
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("audit_log.jsonl"))
            .unwrap();
        std::io::Write::write_all(&mut file, b"\xff\xfe garbage\n").unwrap();
        trail.record(&detected_run("u2"));

        let report = trail.generate_report(&ReportFilter::default()).unwrap();
        assert_eq!(report.compliance_report.summary.total_files_processed, 2);

        let outcome = trail.export_csv(None);
        assert!(outcome.exported);
        assert_eq!(outcome.entries_exported, 2);
    }

    #[test]
    fn test_export_to_chosen_file() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path(), None);
        trail.record(&detected_run("u1"));
        trail.record(&detected_run("u2"));

        let out = dir.path().join("exports/custom.csv");
        let outcome = trail.export_csv(Some(&out));
        assert!(outcome.exported);
        assert_eq!(outcome.entries_exported, 2);
        assert_eq!(outcome.output_file, Some(out.clone()));
        let text = std::fs::read_to_string(out).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
