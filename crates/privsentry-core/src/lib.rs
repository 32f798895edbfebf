//! PrivSentry Core: configuration, errors, PII vocabulary, the pipeline event record.

pub mod config;
pub mod error;
pub mod event;
pub mod fallback;
pub mod pii;

pub use config::{DataPaths, MaskConfig, PrivSentryConfig};
pub use error::{Error, Result};
pub use event::{
    is_redacted_output, redacted_path, IngestionEvent, PipelineEvent, ProcessingStatus,
    RedactionOutcome,
};
pub use fallback::{Fallback, Tier};
pub use pii::{PiiType, PiiTypeSet};
