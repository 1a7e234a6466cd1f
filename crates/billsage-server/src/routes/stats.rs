//! Stats and server info routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::{AppState, JobStatus};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/server-info", get(get_server_info))
}

/// GET /api/stats: bill counts and queue depth.
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store_stats = state.store.get_stats().unwrap_or_else(|_| billsage_store::StoreStats {
        total_bills: 0,
        pending: 0,
        processing: 0,
        analyzed: 0,
        failed: 0,
        progress_records: 0,
        db_path: String::new(),
    });

    let jobs = state.analysis_jobs.read();
    let queued = jobs.values().filter(|j| j.status == JobStatus::Queued).count();
    let processing = jobs
        .values()
        .filter(|j| j.status == JobStatus::Processing)
        .count();

    Json(serde_json::json!({
        "bills": store_stats.total_bills,
        "byStatus": {
            "pending": store_stats.pending,
            "processing": store_stats.processing,
            "analyzed": store_stats.analyzed,
            "failed": store_stats.failed,
        },
        "progressRecords": store_stats.progress_records,
        "analysisQueue": {
            "queued": queued,
            "processing": processing,
        },
    }))
}

/// GET /api/server-info: version, port and configured collaborators.
async fn get_server_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let llm_provider = state
        .llm_config
        .read()
        .resolve_provider()
        .map(|p| p.provider.to_string());

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.port,
        "dataDir": state.config.data_paths.root.to_string_lossy(),
        "extractionUrl": state.config.endpoints.extraction_url,
        "ocrUrl": state.config.endpoints.ocr_url,
        "llmProvider": llm_provider,
        "timeoutSecs": state.config.call_policy.timeout_secs,
        "retries": state.config.call_policy.retries,
    }))
}
