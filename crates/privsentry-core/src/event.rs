//! The pipeline event record threaded through all five stages.
//!
//! Fields accumulate monotonically: identity fields are fixed at ingestion and
//! each stage's output is written exactly once, in stage order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fallback::Tier;
use crate::pii::{PiiType, PiiTypeSet};
use crate::{Error, Result};

/// Current `PipelineEvent` schema version.
pub const RECORD_VERSION: u32 = 1;

/// Marker appended to a file stem to name its redacted copy.
pub const REDACTED_SUFFIX: &str = "_redacted";

/// `dir/name.ext` -> `dir/name_redacted.ext`.
pub fn redacted_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, REDACTED_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, REDACTED_SUFFIX),
    };
    path.with_file_name(name)
}

/// Whether `path` names a file produced by the redaction stage.
pub fn is_redacted_output(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().ends_with(REDACTED_SUFFIX))
        .unwrap_or(false)
}

/// Emitted by ingestion (upload, watch, or directory scan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub event_type: String,
    pub file_path: PathBuf,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl IngestionEvent {
    pub const NEW_FILE: &'static str = "new_file_ingested";

    pub fn new(file_path: impl Into<PathBuf>, user_id: impl Into<String>) -> Self {
        Self::at(file_path, user_id, Utc::now())
    }

    pub fn at(
        file_path: impl Into<PathBuf>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: Self::NEW_FILE.to_string(),
            file_path: file_path.into(),
            user_id: user_id.into(),
            timestamp,
        }
    }
}

/// Outcome status of the redaction stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Result of the redaction stage. Never an `Err`: failures carry `status = error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionOutcome {
    pub redacted_file_path: Option<PathBuf>,
    #[serde(default)]
    pub redacted_pii_types: Vec<PiiType>,
    /// Types that needed masking but were left in place by the pattern masker.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unredacted_pii_types: Vec<PiiType>,
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RedactionOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            redacted_file_path: None,
            redacted_pii_types: Vec::new(),
            unredacted_pii_types: Vec::new(),
            status: ProcessingStatus::Error,
            tier: None,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessingStatus::Success
    }
}

/// The single record passed by value between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    version: u32,
    run_id: Uuid,
    file_path: PathBuf,
    user_id: String,
    /// Ingestion time; carried unchanged into the audit entry.
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pii_findings: Option<PiiTypeSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    consent_results: Option<BTreeMap<PiiType, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redaction: Option<RedactionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<IngestionEvent> for PipelineEvent {
    fn from(ev: IngestionEvent) -> Self {
        Self {
            version: RECORD_VERSION,
            run_id: Uuid::new_v4(),
            file_path: ev.file_path,
            user_id: ev.user_id,
            timestamp: ev.timestamp,
            pii_findings: None,
            consent_results: None,
            redaction: None,
            error: None,
        }
    }
}

impl PipelineEvent {
    pub fn new(file_path: impl Into<PathBuf>, user_id: impl Into<String>) -> Self {
        IngestionEvent::new(file_path, user_id).into()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn pii_findings(&self) -> Option<&PiiTypeSet> {
        self.pii_findings.as_ref()
    }

    pub fn consent_results(&self) -> Option<&BTreeMap<PiiType, bool>> {
        self.consent_results.as_ref()
    }

    pub fn redaction(&self) -> Option<&RedactionOutcome> {
        self.redaction.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn record_detection(&mut self, findings: PiiTypeSet) -> Result<()> {
        if self.pii_findings.is_some() {
            return Err(Error::StageOrder("detection".into()));
        }
        self.pii_findings = Some(findings);
        Ok(())
    }

    /// Store consent results. Every finding without an entry is filled in as `false`.
    pub fn record_consent(&mut self, mut results: BTreeMap<PiiType, bool>) -> Result<()> {
        let findings = self
            .pii_findings
            .as_ref()
            .ok_or_else(|| Error::StageOrder("consent check before detection".into()))?;
        if self.consent_results.is_some() {
            return Err(Error::StageOrder("consent check".into()));
        }
        for pii_type in findings {
            results.entry(*pii_type).or_insert(false);
        }
        self.consent_results = Some(results);
        Ok(())
    }

    pub fn record_redaction(&mut self, outcome: RedactionOutcome) -> Result<()> {
        if self.consent_results.is_none() {
            return Err(Error::StageOrder("redaction before consent check".into()));
        }
        if self.redaction.is_some() {
            return Err(Error::StageOrder("redaction".into()));
        }
        if let Some(err) = &outcome.error {
            self.error.get_or_insert_with(|| err.clone());
        }
        self.redaction = Some(outcome);
        Ok(())
    }

    /// Mark the run terminal-failed. The first failure is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error.get_or_insert_with(|| error.into());
    }

    /// `success` only when redaction completed and nothing failed along the way.
    pub fn processing_status(&self) -> ProcessingStatus {
        match (&self.redaction, &self.error) {
            (Some(outcome), None) => outcome.status,
            _ => ProcessingStatus::Error,
        }
    }
}
