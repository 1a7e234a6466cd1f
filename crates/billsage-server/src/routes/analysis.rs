//! Analysis job routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::{AnalysisJob, AppState, JobStatus};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analysis/status", get(get_analysis_status))
        .route("/analysis/jobs", get(get_analysis_jobs))
        .route("/analysis/jobs/{job_id}", get(get_analysis_job))
}

/// GET /api/analysis/status: job counts by status.
async fn get_analysis_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.analysis_jobs.read();
    let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count();

    Json(serde_json::json!({
        "queued": count(JobStatus::Queued),
        "processing": count(JobStatus::Processing),
        "completed": count(JobStatus::Completed),
        "failed": count(JobStatus::Failed),
        "total": jobs.len(),
    }))
}

/// GET /api/analysis/jobs: newest first.
async fn get_analysis_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.analysis_jobs.read();
    let mut all_jobs: Vec<&AnalysisJob> = jobs.values().collect();
    all_jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));

    Json(serde_json::json!({
        "jobs": all_jobs,
        "total": all_jobs.len(),
    }))
}

async fn get_analysis_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let jobs = state.analysis_jobs.read();
    match jobs.get(&job_id) {
        Some(job) => (StatusCode::OK, Json(serde_json::json!(job))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Job not found" })),
        ),
    }
}
