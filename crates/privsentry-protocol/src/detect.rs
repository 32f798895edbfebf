//! Detection stage: file content -> set of PII types found.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pii::PatternSet;
use privsentry_core::{Error, Fallback, PiiType, PiiTypeSet, Result, Tier};
use privsentry_ingest::read_text;

/// One analyzer hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub entity_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// External PII analyzer contract.
pub trait DetectionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze `text` for the given entity types only.
    fn analyze(&self, text: &str, entity_types: &[PiiType], language: &str) -> Result<Vec<Finding>>;
}

/// Local analyzer backed by the shared regex patterns.
#[derive(Default)]
pub struct RegexAnalyzer {
    patterns: PatternSet,
}

impl RegexAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectionEngine for RegexAnalyzer {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn analyze(&self, text: &str, entity_types: &[PiiType], _language: &str) -> Result<Vec<Finding>> {
        Ok(self
            .patterns
            .detect(text, entity_types)
            .into_iter()
            .map(|e| Finding {
                entity_type: e.entity_type,
                start: e.start,
                end: e.end,
                score: 1.0,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub pii_findings: PiiTypeSet,
    pub status: &'static str,
    pub source: Tier,
}

pub struct Detector {
    engines: Fallback<dyn DetectionEngine>,
    language: String,
}

impl Detector {
    pub fn new(engines: Fallback<dyn DetectionEngine>) -> Self {
        Self {
            engines,
            language: "en".to_string(),
        }
    }

    /// Regex analyzer only.
    pub fn local() -> Self {
        Self::new(Fallback::local("detection", Arc::new(RegexAnalyzer::new())))
    }

    pub fn engines(&self) -> &Fallback<dyn DetectionEngine> {
        &self.engines
    }

    /// Read `file_path` and report the distinct PII types it contains.
    pub fn detect(&self, file_path: &Path) -> Result<DetectionOutcome> {
        if file_path.as_os_str().is_empty() {
            return Err(Error::MissingInput("file_path".into()));
        }
        info!("Scanning {} for PII", file_path.display());
        let text = read_text(file_path)?;
        self.detect_text(&text)
    }

    pub fn detect_text(&self, text: &str) -> Result<DetectionOutcome> {
        let (findings, source) = self
            .engines
            .run(|engine| engine.analyze(text, PiiType::all(), &self.language))?;

        // Engines may return labels outside the requested vocabulary
        let pii_findings: PiiTypeSet = findings
            .into_iter()
            .map(|f| f.entity_type)
            .filter(|t| PiiType::all().contains(t))
            .collect();
        debug!("Detected {:?} via {:?}", pii_findings, source);

        Ok(DetectionOutcome {
            pii_findings,
            status: "scanned",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl DetectionEngine for Offline {
        fn name(&self) -> &'static str {
            "offline"
        }

        fn analyze(&self, _: &str, _: &[PiiType], _: &str) -> Result<Vec<Finding>> {
            Err(Error::Unavailable("analyzer offline".into()))
        }
    }

    struct Canned(Vec<PiiType>);

    impl DetectionEngine for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn analyze(&self, _: &str, _: &[PiiType], _: &str) -> Result<Vec<Finding>> {
            Ok(self
                .0
                .iter()
                .map(|t| Finding {
                    entity_type: *t,
                    start: 0,
                    end: 1,
                    score: 0.9,
                })
                .collect())
        }
    }

    #[test]
    fn test_detect_file_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.txt");
        std::fs::write(&path, "a@example.com, b@example.com, 555-123-4567").unwrap();

        let outcome = Detector::local().detect(&path).unwrap();
        let expected: PiiTypeSet = [PiiType::EmailAddress, PiiType::PhoneNumber].into();
        assert_eq!(outcome.pii_findings, expected);
        assert_eq!(outcome.status, "scanned");
        assert_eq!(outcome.source, Tier::Fallback);
    }

    #[test]
    fn test_no_pii_is_not_an_error() {
        let outcome = Detector::local().detect_text("nothing to see here").unwrap();
        assert!(outcome.pii_findings.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.bin");
        std::fs::write(&path, b"\xff\xfessn 123-45-6789\x80").unwrap();
        let outcome = Detector::local().detect(&path).unwrap();
        assert!(outcome.pii_findings.contains(&PiiType::UsSsn));
    }

    #[test]
    fn test_missing_file_and_path() {
        let det = Detector::local();
        assert!(matches!(det.detect(Path::new("")), Err(Error::MissingInput(_))));
        assert!(matches!(
            det.detect(Path::new("/definitely/not/here.txt")),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_primary_engine_used_when_available() {
        let det = Detector::new(Fallback::new(
            "detection",
            Some(Arc::new(Canned(vec![PiiType::UsPassport, PiiType::UsPassport]))),
            Arc::new(RegexAnalyzer::new()),
        ));
        let outcome = det.detect_text("irrelevant").unwrap();
        assert_eq!(outcome.pii_findings, PiiTypeSet::from([PiiType::UsPassport]));
        assert_eq!(outcome.source, Tier::Primary);
    }

    #[test]
    fn test_offline_engine_falls_back_to_regex() {
        let det = Detector::new(Fallback::new(
            "detection",
            Some(Arc::new(Offline)),
            Arc::new(RegexAnalyzer::new()),
        ));
        let outcome = det.detect_text("reach me at jo@example.org").unwrap();
        assert_eq!(outcome.pii_findings, PiiTypeSet::from([PiiType::EmailAddress]));
        assert_eq!(outcome.source, Tier::Fallback);
    }
}
