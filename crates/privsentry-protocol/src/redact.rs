//! Redaction stage: mask PII types that lack consent into a derived file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::pii::PatternSet;
use privsentry_core::{
    redacted_path, Fallback, MaskConfig, PiiType, PiiTypeSet, ProcessingStatus, RedactionOutcome,
    Result,
};
use privsentry_ingest::read_text;

/// Types to mask: every finding whose consent is absent or false.
pub fn redaction_set(findings: &PiiTypeSet, consent: &BTreeMap<PiiType, bool>) -> PiiTypeSet {
    findings
        .iter()
        .filter(|t| !consent.get(t).copied().unwrap_or(false))
        .copied()
        .collect()
}

/// De-identified text plus which requested types were actually removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deidentified {
    pub text: String,
    pub masked: PiiTypeSet,
    pub unmasked: PiiTypeSet,
}

/// De-identification backend contract.
pub trait RedactionService: Send + Sync {
    fn name(&self) -> &'static str;

    fn deidentify(&self, text: &str, info_types: &PiiTypeSet) -> Result<Deidentified>;
}

/// Fallback masker: every match of a requested type becomes a fixed-width token.
pub struct PatternMasker {
    patterns: PatternSet,
    token: String,
}

impl PatternMasker {
    pub fn new(mask: &MaskConfig) -> Self {
        Self {
            patterns: PatternSet::new(),
            token: mask.token(),
        }
    }
}

impl Default for PatternMasker {
    fn default() -> Self {
        Self::new(&MaskConfig::default())
    }
}

impl RedactionService for PatternMasker {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn deidentify(&self, text: &str, info_types: &PiiTypeSet) -> Result<Deidentified> {
        // Spans are resolved over every pattern so a consented type is never
        // partially masked by an overlapping unconsented one.
        let entities = self.patterns.detect(text, PiiType::all());

        let mut out = String::with_capacity(text.len());
        let mut masked = PiiTypeSet::new();
        let mut last = 0;
        for entity in entities.iter().filter(|e| info_types.contains(&e.entity_type)) {
            out.push_str(&text[last..entity.start]);
            out.push_str(&self.token);
            last = entity.end;
            masked.insert(entity.entity_type);
        }
        out.push_str(&text[last..]);

        let unmasked: PiiTypeSet = info_types.difference(&masked).copied().collect();
        let (unpatterned, unmatched): (Vec<PiiType>, Vec<PiiType>) = unmasked
            .iter()
            .copied()
            .partition(|t| !self.patterns.supports(*t));
        if !unpatterned.is_empty() {
            warn!("Pattern masker has no pattern for {:?}; left unredacted", unpatterned);
        }
        if !unmatched.is_empty() {
            warn!("Pattern masker found no match for {:?}", unmatched);
        }

        Ok(Deidentified {
            text: out,
            masked,
            unmasked,
        })
    }
}

/// Input to the redaction stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedactionRequest {
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Used instead of reading `file_path` when supplied.
    #[serde(default)]
    pub file_contents: Option<String>,
    #[serde(default)]
    pub pii_findings: PiiTypeSet,
    #[serde(default)]
    pub consent_results: BTreeMap<PiiType, bool>,
}

pub struct Redactor {
    services: Fallback<dyn RedactionService>,
}

impl Redactor {
    pub fn new(services: Fallback<dyn RedactionService>) -> Self {
        Self { services }
    }

    /// Pattern masker only.
    pub fn local(mask: &MaskConfig) -> Self {
        Self::new(Fallback::local("redaction", Arc::new(PatternMasker::new(mask))))
    }

    pub fn services(&self) -> &Fallback<dyn RedactionService> {
        &self.services
    }

    /// Never fails: errors are reported through the outcome's `status`.
    pub fn redact(&self, req: &RedactionRequest) -> RedactionOutcome {
        let Some(file_path) = req.file_path.as_deref().filter(|p| !p.as_os_str().is_empty())
        else {
            return RedactionOutcome::failed("Missing required field: file_path");
        };

        if req.file_contents.is_none() && !file_path.exists() {
            return RedactionOutcome::failed("File not found and no contents provided");
        }

        let to_redact = redaction_set(&req.pii_findings, &req.consent_results);
        if to_redact.is_empty() {
            return RedactionOutcome {
                redacted_file_path: Some(file_path.to_path_buf()),
                redacted_pii_types: Vec::new(),
                unredacted_pii_types: Vec::new(),
                status: ProcessingStatus::Success,
                tier: None,
                message: Some("No PII to redact (all have consent)".into()),
                error: None,
            };
        }

        let text = match &req.file_contents {
            Some(contents) => contents.clone(),
            None => match read_text(file_path) {
                Ok(text) => text,
                Err(e) => return RedactionOutcome::failed(e.to_string()),
            },
        };

        let (result, tier) = match self.services.run(|svc| svc.deidentify(&text, &to_redact)) {
            Ok(done) => done,
            Err(e) => {
                error!("Redaction of {} failed: {}", file_path.display(), e);
                return RedactionOutcome::failed(e.to_string());
            }
        };

        let output = redacted_path(file_path);
        if let Err(e) = write_output(&output, &result.text) {
            error!("Failed to write {}: {}", output.display(), e);
            return RedactionOutcome::failed(format!("Failed to write redacted file: {}", e));
        }
        info!(
            "Redacted {:?} from {} into {}",
            result.masked,
            file_path.display(),
            output.display()
        );

        RedactionOutcome {
            redacted_file_path: Some(output),
            redacted_pii_types: result.masked.into_iter().collect(),
            unredacted_pii_types: result.unmasked.into_iter().collect(),
            status: ProcessingStatus::Success,
            tier: Some(tier),
            message: None,
            error: None,
        }
    }
}

fn write_output(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}
