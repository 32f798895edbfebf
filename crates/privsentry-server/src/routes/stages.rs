//! Single-stage routes: detection, consent check/verify, redaction.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiResponse};
use crate::state::AppState;
use privsentry_core::{Error, PiiType, PiiTypeSet};
use privsentry_protocol::RedactionRequest;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/detect", post(detect))
        .route("/consent/check", post(check_consent))
        .route("/consent/verify", post(verify_consent))
        .route("/redact", post(redact))
}

#[derive(Deserialize)]
struct DetectBody {
    #[serde(default)]
    file_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ConsentCheckBody {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    pii_findings: PiiTypeSet,
}

#[derive(Deserialize)]
struct ConsentVerifyBody {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    data_type: Option<PiiType>,
}

async fn detect(State(state): State<Arc<AppState>>, Json(body): Json<DetectBody>) -> ApiResponse {
    blocking(&state, move |s| {
        let path = body
            .file_path
            .ok_or_else(|| Error::MissingInput("file_path".into()))?;
        s.pipeline.detector().detect(&path)
    })
    .await
}

async fn check_consent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsentCheckBody>,
) -> ApiResponse {
    blocking(&state, move |s| {
        s.pipeline.consent().check(&body.user_id, &body.pii_findings)
    })
    .await
}

async fn verify_consent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsentVerifyBody>,
) -> ApiResponse {
    blocking(&state, move |s| {
        let data_type = body
            .data_type
            .ok_or_else(|| Error::MissingInput("data_type".into()))?;
        s.pipeline.consent().verify(&body.user_id, data_type)
    })
    .await
}

/// POST /api/redact: always 200; failures are carried in `status`/`error`.
async fn redact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedactionRequest>,
) -> ApiResponse {
    blocking(&state, move |s| Ok(s.pipeline.redactor().redact(&req))).await
}
