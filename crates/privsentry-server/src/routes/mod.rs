//! HTTP route handlers: one route per stage operation plus full-pipeline runs.

pub mod audit;
pub mod ingest;
pub mod pipeline;
pub mod stages;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;
use privsentry_core::Error;

pub(crate) type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(ingest::routes())
        .merge(stages::routes())
        .merge(audit::routes())
        .merge(pipeline::routes())
}

pub(crate) fn ok<T: Serialize>(value: T) -> ApiResponse {
    match serde_json::to_value(value) {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(e) => internal(e.to_string()),
    }
}

pub(crate) fn error_response(e: &Error) -> ApiResponse {
    let status = match e {
        Error::MissingInput(_) => StatusCode::BAD_REQUEST,
        Error::FileNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

fn internal(message: String) -> ApiResponse {
    error!("Request failed: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
}

/// Run a stage call on the blocking pool. Stage backends do synchronous I/O.
pub(crate) async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> ApiResponse
where
    F: FnOnce(&AppState) -> privsentry_core::Result<T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let state = state.clone();
    match tokio::task::spawn_blocking(move || f(&state)).await {
        Ok(Ok(value)) => ok(value),
        Ok(Err(e)) => error_response(&e),
        Err(e) => internal(format!("Task failed: {}", e)),
    }
}
