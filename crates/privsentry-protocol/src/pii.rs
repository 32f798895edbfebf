//! PII pattern matching using regex patterns.
//!
//! Shared by the local analyzer (detection fallback) and the pattern masker
//! (redaction fallback), so both tiers agree on what each type looks like.
//! Driver's license and passport numbers have no reliable pattern and are
//! only found by an external analyzer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use privsentry_core::PiiType;

/// A matched PII span. The matched text is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct PiiEntity {
    pub entity_type: PiiType,
    pub start: usize,
    pub end: usize,
    #[serde(skip)]
    pub text: String,
}

// Compiled regex patterns (compiled once, reused).
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static SSN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap());
static PERSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").unwrap());

/// Ordered set of type patterns. Earlier entries win ties on overlapping spans.
pub struct PatternSet {
    patterns: Vec<(PiiType, &'static Regex)>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self {
            patterns: vec![
                (PiiType::EmailAddress, &EMAIL_RE),
                (PiiType::UsSsn, &SSN_RE),
                (PiiType::CreditCardNumber, &CC_RE),
                (PiiType::PhoneNumber, &PHONE_RE),
                (PiiType::PersonName, &PERSON_RE),
            ],
        }
    }

    pub fn supports(&self, pii_type: PiiType) -> bool {
        self.patterns.iter().any(|(t, _)| *t == pii_type)
    }

    /// Find non-overlapping PII spans of the given types, in text order.
    pub fn detect(&self, text: &str, types: &[PiiType]) -> Vec<PiiEntity> {
        let mut entities = Vec::new();

        for (pii_type, regex) in self.patterns.iter().filter(|(t, _)| types.contains(t)) {
            for m in regex.find_iter(text) {
                entities.push(PiiEntity {
                    entity_type: *pii_type,
                    start: m.start(),
                    end: m.end(),
                    text: m.as_str().to_string(),
                });
            }
        }

        // Sort by position, longest match first for overlapping (stable: pattern order breaks ties)
        entities.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        // Remove overlapping entities (keep first/longest)
        let mut filtered = Vec::new();
        let mut last_end = 0;
        for entity in entities {
            if entity.start >= last_end {
                last_end = entity.end;
                filtered.push(entity);
            }
        }

        filtered
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new()
    }
}
