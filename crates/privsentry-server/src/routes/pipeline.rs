//! Full-pipeline runs and backend health.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiResponse};
use crate::state::AppState;
use privsentry_core::Error;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pipeline/run", post(run))
        .route("/pipeline/run-latest", post(run_latest))
        .route("/health", get(health))
}

#[derive(Deserialize)]
struct RunBody {
    #[serde(default)]
    file_path: Option<PathBuf>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn run(State(state): State<Arc<AppState>>, Json(body): Json<RunBody>) -> ApiResponse {
    blocking(&state, move |s| {
        let path = body
            .file_path
            .ok_or_else(|| Error::MissingInput("file_path".into()))?;
        Ok(s.pipeline.process_file(&path, body.user_id.as_deref()))
    })
    .await
}

async fn run_latest(State(state): State<Arc<AppState>>) -> ApiResponse {
    blocking(&state, |s| {
        Ok(match s.pipeline.run_latest()? {
            Some(run) => serde_json::to_value(run)?,
            None => serde_json::json!({
                "status": "no_files",
                "message": "No files found in watched directory",
            }),
        })
    })
    .await
}

/// GET /api/health: which backend each stage will try first.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "monitoring": state.pipeline.ingest().is_monitoring(),
        "watched_directory": state.pipeline.ingest().intake_dir(),
        "backends": state.pipeline.backends(),
    }))
}
