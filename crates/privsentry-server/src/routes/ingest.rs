//! Ingestion routes: upload, watch control, latest-file polling.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiResponse};
use crate::state::AppState;
use privsentry_core::Error;
use privsentry_ingest::PollOutcome;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest/upload", post(upload))
        .route("/ingest/monitor/start", post(start_monitoring))
        .route("/ingest/monitor/stop", post(stop_monitoring))
        .route("/ingest/latest", get(latest))
}

#[derive(Deserialize)]
struct UploadBody {
    #[serde(default)]
    source_path: Option<PathBuf>,
    #[serde(default)]
    user_id: Option<String>,
}

/// POST /api/ingest/upload: copy a file into the intake.
async fn upload(State(state): State<Arc<AppState>>, Json(body): Json<UploadBody>) -> ApiResponse {
    blocking(&state, move |s| {
        let source = body
            .source_path
            .ok_or_else(|| Error::MissingInput("source_path".into()))?;
        s.pipeline.ingest().upload(&source, body.user_id.as_deref())
    })
    .await
}

async fn start_monitoring(State(state): State<Arc<AppState>>) -> ApiResponse {
    blocking(&state, |s| s.pipeline.ingest().start_monitoring()).await
}

async fn stop_monitoring(State(state): State<Arc<AppState>>) -> ApiResponse {
    // Joins the watch thread
    blocking(&state, |s| Ok(s.pipeline.ingest().stop_monitoring())).await
}

/// GET /api/ingest/latest: consume the pending event or scan for the newest file.
async fn latest(State(state): State<Arc<AppState>>) -> ApiResponse {
    blocking(&state, |s| {
        Ok(match s.pipeline.ingest().poll()? {
            PollOutcome::Event(event) => serde_json::to_value(event)?,
            PollOutcome::NoFiles => serde_json::json!({
                "status": "no_files",
                "message": "No files found in watched directory",
            }),
        })
    })
    .await
}
