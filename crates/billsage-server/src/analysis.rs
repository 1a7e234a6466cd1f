//! Background analysis queue. Each request runs the bill pipeline in its
//! own task so a slow bill never holds up the others.

use std::sync::Arc;

use tracing::{error, info};

use crate::state::{AnalysisRequest, AppState, JobStatus};

/// Finished jobs kept in the table for status queries.
const MAX_FINISHED_JOBS: usize = 100;

/// Start the background analysis worker task.
pub fn start_analysis_worker(state: Arc<AppState>) {
    let mut rx = match state.take_analysis_rx() {
        Some(rx) => rx,
        None => {
            error!("Analysis worker already started");
            return;
        }
    };

    tokio::spawn(async move {
        info!("Background analysis worker started");
        while let Some(request) = rx.recv().await {
            let state = state.clone();
            tokio::spawn(async move {
                process_analysis_job(&state, request).await;
            });
        }
    });
}

pub(crate) async fn process_analysis_job(state: &AppState, request: AnalysisRequest) {
    {
        let mut jobs = state.analysis_jobs.write();
        if let Some(job) = jobs.get_mut(&request.job_id) {
            job.status = JobStatus::Processing;
            job.started_at = Some(now_millis());
        }
    }

    info!(
        "Processing analysis job {} for bill {}",
        request.job_id, request.bill_id
    );

    let result = state
        .pipeline
        .analyze(&request.bill_id, request.reanalyze)
        .await;

    {
        let mut jobs = state.analysis_jobs.write();
        if let Some(job) = jobs.get_mut(&request.job_id) {
            job.completed_at = Some(now_millis());
            match &result {
                Ok(report) => {
                    job.status = JobStatus::Completed;
                    job.report = Some(report.clone());
                }
                Err(e) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(e.to_string());
                }
            }
        }
    }

    match result {
        Ok(report) => info!(
            "Analyzed bill {}: {} services in {}ms",
            request.bill_id, report.services, report.duration_ms
        ),
        Err(e) => error!("Analysis of bill {} failed: {}", request.bill_id, e),
    }

    cleanup_old_jobs(state);
}

fn cleanup_old_jobs(state: &AppState) {
    let mut jobs = state.analysis_jobs.write();
    let mut finished: Vec<(String, i64)> = jobs
        .iter()
        .filter(|(_, j)| !j.status.is_active())
        .map(|(id, j)| (id.clone(), j.completed_at.unwrap_or(0)))
        .collect();

    if finished.len() > MAX_FINISHED_JOBS {
        finished.sort_by_key(|(_, t)| *t);
        let remove_count = finished.len() - MAX_FINISHED_JOBS;
        for (id, _) in finished.into_iter().take(remove_count) {
            jobs.remove(&id);
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
