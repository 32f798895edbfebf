//! PrivSentry server: HTTP ad-hoc API over the pipeline stages.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
