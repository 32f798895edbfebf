//! Runtime types.

use serde::Serialize;

use privsentry_audit::AuditReceipt;
use privsentry_core::{Fallback, PipelineEvent};

/// Terminal state of one run plus the audit outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub event: PipelineEvent,
    pub audit: AuditReceipt,
}

/// Which backends a stage will try, in order.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub stage: &'static str,
    pub primary: Option<&'static str>,
    pub fallback: &'static str,
}

impl BackendInfo {
    pub fn of<T: ?Sized>(fallback: &Fallback<T>, name: impl Fn(&T) -> &'static str) -> Self {
        Self {
            stage: fallback.name(),
            primary: fallback.primary().map(&name),
            fallback: name(fallback.secondary()),
        }
    }
}
