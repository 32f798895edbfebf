//! Privacy protocol: the detection, consent check and redaction stages.
//!
//! Each stage talks to an external collaborator through a trait
//! (`DetectionEngine`, `ConsentStore`, `RedactionService`) wrapped in a
//! two-tier `Fallback`: the configured primary backend first, then a local
//! implementation (regex analyzer, built-in consent table, pattern masker).

pub mod consent;
pub mod detect;
pub mod http;
pub mod pii;
pub mod redact;

pub use consent::{
    ConsentChecker, ConsentOutcome, ConsentRecord, ConsentStore, ConsentVerdict,
    LocalConsentTable, SqliteConsentStore, UserConsents,
};
pub use detect::{DetectionEngine, DetectionOutcome, Detector, Finding, RegexAnalyzer};
pub use http::{DeidentifyService, HttpAnalyzer};
pub use pii::{PatternSet, PiiEntity};
pub use redact::{
    redaction_set, Deidentified, PatternMasker, RedactionRequest, RedactionService, Redactor,
};
