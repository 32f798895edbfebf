//! Pipeline: ingestion → detection → consent check → redaction → audit.
//!
//! One run is strictly sequential. A stage failure marks the event failed and
//! skips the remaining transform stages, but the run is always audited.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::types::{BackendInfo, PipelineRun};
use privsentry_audit::AuditTrail;
use privsentry_core::{Fallback, IngestionEvent, PipelineEvent, PrivSentryConfig, Result};
use privsentry_ingest::{IngestionService, PollOutcome};
use privsentry_protocol::{
    ConsentChecker, ConsentStore, DeidentifyService, DetectionEngine, Detector, HttpAnalyzer,
    LocalConsentTable, PatternMasker, RedactionRequest, RedactionService, Redactor, RegexAnalyzer,
    SqliteConsentStore,
};

pub struct Pipeline {
    ingest: IngestionService,
    detector: Detector,
    consent: ConsentChecker,
    redactor: Redactor,
    audit: AuditTrail,
}

impl Pipeline {
    pub fn new(
        ingest: IngestionService,
        detector: Detector,
        consent: ConsentChecker,
        redactor: Redactor,
        audit: AuditTrail,
    ) -> Self {
        Self {
            ingest,
            detector,
            consent,
            redactor,
            audit,
        }
    }

    /// Build every stage from configuration. Primaries that are unset or fail
    /// to initialize are left out, so their fallbacks answer alone.
    pub fn from_config(config: &PrivSentryConfig) -> Self {
        let analyzer: Option<Arc<dyn DetectionEngine>> = config.detection_url.as_deref().and_then(
            |url| match HttpAnalyzer::new(url) {
                Ok(a) => Some(Arc::new(a) as Arc<dyn DetectionEngine>),
                Err(e) => {
                    warn!("Detection engine unavailable: {}", e);
                    None
                }
            },
        );

        let consent_store: Option<Arc<dyn ConsentStore>> = match config.consent_table() {
            Ok(table) => match SqliteConsentStore::open(&config.data_paths.consent_db, &table) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!("Consent store unavailable: {}", e);
                    None
                }
            },
            Err(e) => {
                info!("Consent store disabled ({}). Using built-in table.", e);
                None
            }
        };

        let deidentify: Option<Arc<dyn RedactionService>> =
            match (&config.redaction_url, &config.project) {
                (Some(url), Some(project)) => {
                    match DeidentifyService::new(url, project, config.mask.ch) {
                        Ok(svc) => Some(Arc::new(svc)),
                        Err(e) => {
                            warn!("Redaction service unavailable: {}", e);
                            None
                        }
                    }
                }
                (Some(_), None) => {
                    warn!("PRIVSENTRY_REDACTION_URL set without PRIVSENTRY_PROJECT; using pattern masker");
                    None
                }
                _ => None,
            };

        Self::new(
            IngestionService::from_config(config),
            Detector::new(Fallback::new(
                "detection",
                analyzer,
                Arc::new(RegexAnalyzer::new()),
            )),
            ConsentChecker::new(Fallback::new(
                "consent",
                consent_store,
                Arc::new(LocalConsentTable::with_defaults()),
            )),
            Redactor::new(Fallback::new(
                "redaction",
                deidentify,
                Arc::new(PatternMasker::new(&config.mask)),
            )),
            AuditTrail::from_config(config),
        )
    }

    pub fn ingest(&self) -> &IngestionService {
        &self.ingest
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn consent(&self) -> &ConsentChecker {
        &self.consent
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Backend tiers configured for each stage.
    pub fn backends(&self) -> Vec<BackendInfo> {
        vec![
            BackendInfo::of(self.detector.engines(), |e| e.name()),
            BackendInfo::of(self.consent.stores(), |s| s.name()),
            BackendInfo::of(self.redactor.services(), |s| s.name()),
            BackendInfo::of(self.audit.sinks(), |s| s.name()),
        ]
    }

    /// Process a file that is already in place.
    pub fn process_file(&self, file_path: &Path, user_id: Option<&str>) -> PipelineRun {
        let user_id = user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.ingest.default_user_id());
        self.run(IngestionEvent::new(file_path, user_id))
    }

    /// Run all stages for one ingestion event and audit the outcome.
    pub fn run(&self, ingestion: IngestionEvent) -> PipelineRun {
        let mut event = PipelineEvent::from(ingestion);
        info!(
            "Pipeline run {} started: {} (user {})",
            event.run_id(),
            event.file_path().display(),
            event.user_id()
        );

        self.detect(&mut event);
        self.check_consent(&mut event);
        self.redact(&mut event);

        let audit = self.audit.record(&event);
        info!(
            "Pipeline run {} finished: {} (user {}) -> {}",
            event.run_id(),
            event.file_path().display(),
            event.user_id(),
            event.processing_status().as_str()
        );
        PipelineRun { event, audit }
    }

    /// Run on the pending watch event, or the newest intake file. `None` when
    /// the intake is empty.
    pub fn run_latest(&self) -> Result<Option<PipelineRun>> {
        match self.ingest.poll()? {
            PollOutcome::Event(ev) => Ok(Some(self.run(ev))),
            PollOutcome::NoFiles => Ok(None),
        }
    }

    fn detect(&self, event: &mut PipelineEvent) {
        let result = self
            .detector
            .detect(event.file_path())
            .and_then(|d| event.record_detection(d.pii_findings));
        if let Err(e) = result {
            warn!("Detection failed for {}: {}", event.file_path().display(), e);
            event.fail(e.to_string());
        }
    }

    fn check_consent(&self, event: &mut PipelineEvent) {
        if event.error().is_some() {
            return;
        }
        let Some(findings) = event.pii_findings().cloned() else {
            return;
        };
        // Nothing found, nothing to ask the consent store
        let results = if findings.is_empty() {
            Ok(BTreeMap::new())
        } else {
            self.consent
                .check(event.user_id(), &findings)
                .map(|o| o.consent_results)
        };
        if let Err(e) = results.and_then(|r| event.record_consent(r)) {
            warn!("Consent check failed for {}: {}", event.file_path().display(), e);
            event.fail(e.to_string());
        }
    }

    fn redact(&self, event: &mut PipelineEvent) {
        if event.error().is_some() {
            return;
        }
        let (Some(findings), Some(consent)) = (event.pii_findings(), event.consent_results())
        else {
            return;
        };
        let request = RedactionRequest {
            file_path: Some(event.file_path().to_path_buf()),
            file_contents: None,
            pii_findings: findings.clone(),
            consent_results: consent.clone(),
        };
        let outcome = self.redactor.redact(&request);
        if let Err(e) = event.record_redaction(outcome) {
            event.fail(e.to_string());
        }
    }
}
