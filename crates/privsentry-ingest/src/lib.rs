//! PrivSentry Ingest: upload, passive intake watch, best-effort text reading.

pub mod file;
pub mod ingest;
pub mod watch;

pub use file::{decode_lossy, read_text};
pub use ingest::{IngestionService, MonitorReport, MonitorStatus, PollOutcome};
pub use watch::{PendingSlot, WatchEvent, WatchKind};
