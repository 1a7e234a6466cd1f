//! Per-bill progress record routes.
//!
//! The PUT handler is the write path for trackers running outside the
//! server process.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use billsage_core::ProgressRecord;

use super::{error_response, not_found};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/bills/{id}/progress",
        get(get_progress).put(put_progress).delete(delete_progress),
    )
}

/// Incoming record. `status` and `timestamp` are accepted but recomputed.
#[derive(Deserialize)]
struct ProgressBody {
    progress: f64,
    stage: String,
    #[serde(default)]
    message: String,
}

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_progress(&id) {
        Ok(Some(record)) => (StatusCode::OK, Json(serde_json::json!(record))),
        Ok(None) => not_found("Progress"),
        Err(e) => error_response(&e),
    }
}

/// PUT /api/bills/:id/progress: insert or overwrite the record.
///
/// Keyed by bill ID alone, like direct store writes; no bill row is needed.
async fn put_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> impl IntoResponse {
    // Status always follows the percent, whatever the client sent.
    let record = ProgressRecord::new(body.stage, body.progress * 100.0, body.message);
    match state.store.put_progress(&id, &record) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!(record))),
        Err(e) => error_response(&e),
    }
}

async fn delete_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_progress(&id) {
        Ok(existed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "existed": existed })),
        ),
        Err(e) => error_response(&e),
    }
}
