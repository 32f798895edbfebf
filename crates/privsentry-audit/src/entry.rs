//! Audit entry: one immutable line per pipeline run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use privsentry_core::{PiiType, PipelineEvent, ProcessingStatus};

/// `compliant` iff the run's processing status is `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn of(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Success => Self::Compliant,
            ProcessingStatus::Error => Self::NonCompliant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    #[serde(default)]
    pub run_id: String,
    /// Ingestion time of the originating event.
    pub timestamp: DateTime<Utc>,
    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
    pub file_path: PathBuf,
    pub user_id: String,
    #[serde(default)]
    pub pii_types_detected: Vec<PiiType>,
    #[serde(default)]
    pub consent_status: BTreeMap<PiiType, bool>,
    #[serde(default)]
    pub redacted_pii_types: Vec<PiiType>,
    #[serde(default)]
    pub redacted_file_path: Option<PathBuf>,
    pub processing_status: ProcessingStatus,
    compliance_status: ComplianceStatus,
}

impl AuditEntry {
    pub const COMPLETED: &'static str = "file_processing_completed";

    /// Snapshot the terminal state of a run.
    pub fn from_event(event: &PipelineEvent, recorded_at: DateTime<Utc>) -> Self {
        let redaction = event.redaction();
        let processing_status = event.processing_status();
        Self {
            event_type: Self::COMPLETED.to_string(),
            run_id: event.run_id().to_string(),
            timestamp: event.timestamp(),
            recorded_at,
            file_path: event.file_path().to_path_buf(),
            user_id: event.user_id().to_string(),
            pii_types_detected: event
                .pii_findings()
                .map(|f| f.iter().copied().collect())
                .unwrap_or_default(),
            consent_status: event.consent_results().cloned().unwrap_or_default(),
            redacted_pii_types: redaction
                .map(|r| r.redacted_pii_types.clone())
                .unwrap_or_default(),
            redacted_file_path: redaction.and_then(|r| r.redacted_file_path.clone()),
            processing_status,
            compliance_status: ComplianceStatus::of(processing_status),
        }
    }

    /// Always recomputed from `processing_status`, whatever was persisted.
    pub fn compliance_status(&self) -> ComplianceStatus {
        ComplianceStatus::of(self.processing_status)
    }

    pub fn is_compliant(&self) -> bool {
        self.compliance_status() == ComplianceStatus::Compliant
    }
}
