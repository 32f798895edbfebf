//! Shared application state.

use privsentry_core::PrivSentryConfig;
use privsentry_runtime::Pipeline;

/// Shared application state accessible from all route handlers.
///
/// Stage backends may hold blocking HTTP clients, so build this outside the
/// async runtime (e.g. inside `spawn_blocking`).
pub struct AppState {
    pub config: PrivSentryConfig,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: PrivSentryConfig) -> Self {
        let pipeline = Pipeline::from_config(&config);
        Self { config, pipeline }
    }
}
