//! Two-tier backend strategy: try the primary, degrade to the secondary.
//!
//! Every external collaborator (detection engine, consent store, redaction
//! service, audit sink) is wrapped in a `Fallback`. Failures of the primary are
//! logged and never surface to the caller; the returned `Tier` records which
//! backend produced the value.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;

/// Which backend answered a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Fallback,
}

pub struct Fallback<T: ?Sized> {
    name: &'static str,
    primary: Option<Arc<T>>,
    secondary: Arc<T>,
}

impl<T: ?Sized> Fallback<T> {
    pub fn new(name: &'static str, primary: Option<Arc<T>>, secondary: Arc<T>) -> Self {
        Self {
            name,
            primary,
            secondary,
        }
    }

    /// Secondary only; the primary is disabled.
    pub fn local(name: &'static str, secondary: Arc<T>) -> Self {
        Self::new(name, None, secondary)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary(&self) -> Option<&T> {
        self.primary.as_deref()
    }

    pub fn secondary(&self) -> &T {
        &self.secondary
    }

    /// Run `op` against the primary, then against the secondary if the primary
    /// is disabled or errors. The secondary's error is returned as-is.
    pub fn run<R>(&self, op: impl Fn(&T) -> Result<R>) -> Result<(R, Tier)> {
        if let Some(primary) = &self.primary {
            match op(primary) {
                Ok(value) => return Ok((value, Tier::Primary)),
                Err(e) => warn!("{} primary backend failed: {}. Using fallback.", self.name, e),
            }
        }
        op(&self.secondary).map(|value| (value, Tier::Fallback))
    }

    /// Like `run`, but a primary answer of `None` also falls through.
    pub fn first_some<R>(&self, op: impl Fn(&T) -> Result<Option<R>>) -> Result<(Option<R>, Tier)> {
        if let Some(primary) = &self.primary {
            match op(primary) {
                Ok(Some(value)) => return Ok((Some(value), Tier::Primary)),
                Ok(None) => debug!("{} primary backend has no record. Using fallback.", self.name),
                Err(e) => warn!("{} primary backend failed: {}. Using fallback.", self.name, e),
            }
        }
        op(&self.secondary).map(|value| (value, Tier::Fallback))
    }
}
