//! Audit routes: record, compliance report, CSV export.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiResponse};
use crate::state::AppState;
use privsentry_audit::ReportFilter;
use privsentry_core::{Error, PipelineEvent};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/audit/record", post(record))
        .route("/audit/report", post(report))
        .route("/audit/export", post(export))
}

#[derive(Deserialize)]
struct RecordBody {
    #[serde(default)]
    event: Option<PipelineEvent>,
}

#[derive(Deserialize)]
struct ExportBody {
    #[serde(default)]
    output_file: Option<PathBuf>,
}

async fn record(State(state): State<Arc<AppState>>, Json(body): Json<RecordBody>) -> ApiResponse {
    blocking(&state, move |s| {
        let event = body.event.ok_or_else(|| Error::MissingInput("event".into()))?;
        Ok(s.pipeline.audit().record(&event))
    })
    .await
}

async fn report(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<ReportFilter>,
) -> ApiResponse {
    blocking(&state, move |s| s.pipeline.audit().generate_report(&filter)).await
}

/// POST /api/audit/export: `exported: false` with an `error` when there is nothing to export.
async fn export(State(state): State<Arc<AppState>>, Json(body): Json<ExportBody>) -> ApiResponse {
    blocking(&state, move |s| {
        Ok(s.pipeline.audit().export_csv(body.output_file.as_deref()))
    })
    .await
}
