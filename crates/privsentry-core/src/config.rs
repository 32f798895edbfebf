//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Paths to all PrivSentry data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Watched intake directory (`data/intake/`).
    pub intake: PathBuf,
    /// Durable local audit log (`data/audit_log.jsonl`).
    pub audit_log: PathBuf,
    /// Compliance report snapshot (`data/compliance_report.json`).
    pub report_file: PathBuf,
    /// Default CSV export target (`data/audit_export.csv`).
    pub export_file: PathBuf,
    /// Primary consent store database (`data/consents.db`).
    pub consent_db: PathBuf,
    /// Analytical audit store database (`data/analytics.db`).
    pub analytics_db: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            intake: root.join("intake"),
            audit_log: root.join("audit_log.jsonl"),
            report_file: root.join("compliance_report.json"),
            export_file: root.join("audit_export.csv"),
            consent_db: root.join("consents.db"),
            analytics_db: root.join("analytics.db"),
            root,
        };
        std::fs::create_dir_all(&paths.root)?;
        std::fs::create_dir_all(&paths.intake)?;
        Ok(paths)
    }
}

/// Fallback masker token: `len` copies of `ch`, independent of match length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskConfig {
    pub ch: char,
    pub len: usize,
}

impl MaskConfig {
    pub fn token(&self) -> String {
        std::iter::repeat(self.ch).take(self.len).collect()
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self { ch: '█', len: 10 }
    }
}

/// Top-level PrivSentry configuration.
///
/// Every primary backend is optional; an unset variable leaves the
/// corresponding fallback as the only tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivSentryConfig {
    /// HTTP server port.
    pub port: u16,
    pub data_paths: DataPaths,
    /// Project identifier required by the redaction service and analytical store.
    pub project: Option<String>,
    pub audit_dataset: String,
    pub audit_table: String,
    pub analytics_enabled: bool,
    /// Collection (table) name in the primary consent store.
    pub consent_collection: Option<String>,
    /// Base URL of the external PII analyzer.
    pub detection_url: Option<String>,
    /// Base URL of the de-identification service.
    pub redaction_url: Option<String>,
    /// User attached to watch-discovered files and anonymous uploads.
    pub default_user_id: String,
    pub mask: MaskConfig,
    /// Number of recent audit entries included in reports.
    pub recent_entries: usize,
    pub watch_interval_ms: u64,
}

impl PrivSentryConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup(
        data_dir: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::io::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3004);
        let analytics_enabled = var("PRIVSENTRY_ANALYTICS_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let mut mask = MaskConfig::default();
        if let Some(ch) = var("PRIVSENTRY_MASK_CHAR").and_then(|v| v.chars().next()) {
            mask.ch = ch;
        }
        if let Some(len) = var("PRIVSENTRY_MASK_LEN").and_then(|v| v.parse().ok()) {
            mask.len = len;
        }

        Ok(Self {
            port,
            data_paths: DataPaths::new(data_dir)?,
            project: var("PRIVSENTRY_PROJECT"),
            audit_dataset: var("PRIVSENTRY_AUDIT_DATASET").unwrap_or_else(|| "privacy_audit".into()),
            audit_table: var("PRIVSENTRY_AUDIT_TABLE").unwrap_or_else(|| "audit_events".into()),
            analytics_enabled,
            consent_collection: var("PRIVSENTRY_CONSENT_COLLECTION"),
            detection_url: var("PRIVSENTRY_DETECTION_URL"),
            redaction_url: var("PRIVSENTRY_REDACTION_URL"),
            default_user_id: var("PRIVSENTRY_DEFAULT_USER").unwrap_or_else(|| "user123".into()),
            mask,
            recent_entries: var("PRIVSENTRY_RECENT_ENTRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            watch_interval_ms: var("PRIVSENTRY_WATCH_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
        })
    }

    /// Table backing the analytical audit store, or an error naming why it is off.
    pub fn analytics_table(&self) -> Result<String> {
        if !self.analytics_enabled {
            return Err(Error::Config("analytical store disabled".into()));
        }
        if self.project.is_none() {
            return Err(Error::Config("PRIVSENTRY_PROJECT not set".into()));
        }
        let dataset = validate_identifier(&self.audit_dataset)?;
        let table = validate_identifier(&self.audit_table)?;
        Ok(format!("{}_{}", dataset, table))
    }

    /// Table backing the primary consent store.
    pub fn consent_table(&self) -> Result<String> {
        let collection = self
            .consent_collection
            .as_deref()
            .ok_or_else(|| Error::Config("PRIVSENTRY_CONSENT_COLLECTION not set".into()))?;
        validate_identifier(collection).map(str::to_string)
    }
}

/// SQL identifiers come from the environment; restrict them to `[A-Za-z0-9_]+`.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(Error::Config(format!("invalid identifier: {:?}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> (PrivSentryConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = PrivSentryConfig::from_lookup(dir.path(), |k| map.get(k).cloned()).unwrap();
        (config, dir)
    }

    #[test]
    fn test_defaults_disable_primaries() {
        let (config, _dir) = config_with(&[]);
        assert_eq!(config.port, 3004);
        assert_eq!(config.default_user_id, "user123");
        assert_eq!(config.mask.token(), "██████████");
        assert!(config.analytics_table().is_err());
        assert!(config.consent_table().is_err());
        assert!(config.redaction_url.is_none());
        assert!(config.data_paths.intake.is_dir());
    }

    #[test]
    fn test_analytics_requires_flag_and_project() {
        let (config, _dir) = config_with(&[("PRIVSENTRY_ANALYTICS_ENABLED", "true")]);
        assert!(config.analytics_table().is_err());

        let (config, _dir) = config_with(&[
            ("PRIVSENTRY_ANALYTICS_ENABLED", "1"),
            ("PRIVSENTRY_PROJECT", "acme"),
        ]);
        assert_eq!(config.analytics_table().unwrap(), "privacy_audit_audit_events");
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let (config, _dir) = config_with(&[("PRIVSENTRY_CONSENT_COLLECTION", "users; DROP")]);
        assert!(config.consent_table().is_err());
    }

    #[test]
    fn test_mask_override() {
        let (config, _dir) = config_with(&[
            ("PRIVSENTRY_MASK_CHAR", "*"),
            ("PRIVSENTRY_MASK_LEN", "4"),
        ]);
        assert_eq!(config.mask.token(), "****");
    }

    #[test]
    fn test_blank_values_treated_as_unset() {
        let (config, _dir) = config_with(&[("PRIVSENTRY_REDACTION_URL", "  ")]);
        assert!(config.redaction_url.is_none());
    }
}
