//! Flat CSV export of the audit history.

use std::path::Path;

use crate::entry::AuditEntry;
use privsentry_core::{Error, PiiType, Result};

pub const CSV_COLUMNS: [&str; 10] = [
    "timestamp",
    "event_type",
    "file_path",
    "user_id",
    "pii_types_detected",
    "consent_status",
    "redacted_pii_types",
    "redacted_file_path",
    "processing_status",
    "compliance_status",
];

fn join_types(types: &[PiiType]) -> String {
    types
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn row(entry: &AuditEntry) -> Result<[String; 10]> {
    Ok([
        entry.timestamp.to_rfc3339(),
        entry.event_type.clone(),
        entry.file_path.display().to_string(),
        entry.user_id.clone(),
        join_types(&entry.pii_types_detected),
        serde_json::to_string(&entry.consent_status)?,
        join_types(&entry.redacted_pii_types),
        entry
            .redacted_file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        entry.processing_status.as_str().to_string(),
        entry.compliance_status().as_str().to_string(),
    ])
}

/// Write `entries` to `output` with a header row. Returns the number of rows.
pub fn write_csv(entries: &[AuditEntry], output: &Path) -> Result<usize> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output).map_err(|e| Error::Export(e.to_string()))?;
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| Error::Export(e.to_string()))?;
    for entry in entries {
        writer
            .write_record(row(entry)?)
            .map_err(|e| Error::Export(e.to_string()))?;
    }
    writer.flush()?;
    Ok(entries.len())
}
