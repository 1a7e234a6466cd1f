//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use billsage_chat::{CompletionClient, HttpCompletionClient, LLMConfig};
use billsage_classify::DecisionEngine;
use billsage_core::BillSageConfig;
use billsage_extract::{
    ExtractionService, HttpExtractionService, HttpOcrService, HttpQaService, OcrService, QaService,
};
use billsage_runtime::{
    AnalysisPipeline, ExecutionContext, PolicyCompletionClient, ProgressTracker, RunReport,
};
use billsage_store::SqliteStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Analysis job status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    pub bill_id: String,
    pub reanalyze: bool,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

/// A request to analyze one bill.
pub struct AnalysisRequest {
    pub job_id: String,
    pub bill_id: String,
    pub reanalyze: bool,
}

/// External collaborators the server talks to.
pub struct Collaborators {
    pub ocr: Arc<dyn OcrService>,
    pub extraction: Arc<dyn ExtractionService>,
    pub qa: Arc<dyn QaService>,
    pub completion: Arc<dyn CompletionClient>,
}

impl Collaborators {
    /// HTTP clients for every collaborator, built from config.
    pub fn from_config(config: &BillSageConfig, llm_config: Arc<RwLock<LLMConfig>>) -> Self {
        let client = reqwest::Client::new();
        let endpoints = &config.endpoints;
        Self {
            ocr: Arc::new(HttpOcrService::new(client.clone(), &endpoints.ocr_url)),
            extraction: Arc::new(HttpExtractionService::new(
                client.clone(),
                &endpoints.extraction_url,
                &endpoints.extraction_model,
            )),
            qa: Arc::new(HttpQaService::new(client.clone(), &endpoints.qa_url)),
            completion: Arc::new(HttpCompletionClient::new(client, llm_config)),
        }
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: BillSageConfig,
    pub store: Arc<SqliteStore>,
    pub llm_config: Arc<RwLock<LLMConfig>>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub qa: Arc<dyn QaService>,
    pub analysis_jobs: RwLock<HashMap<String, AnalysisJob>>,
    pub analysis_tx: mpsc::UnboundedSender<AnalysisRequest>,
    analysis_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<AnalysisRequest>>>,
}

impl AppState {
    pub fn new(config: BillSageConfig, store: SqliteStore) -> Self {
        let llm_config = Arc::new(RwLock::new(LLMConfig::load(
            &config.data_paths.llm_config_file,
        )));
        let collaborators = Collaborators::from_config(&config, llm_config.clone());
        Self::with_collaborators(config, Arc::new(store), llm_config, collaborators)
    }

    pub fn with_collaborators(
        config: BillSageConfig,
        store: Arc<SqliteStore>,
        llm_config: Arc<RwLock<LLMConfig>>,
        collaborators: Collaborators,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let completion: Arc<dyn CompletionClient> = Arc::new(PolicyCompletionClient::new(
            collaborators.completion,
            config.call_policy,
        ));
        // The server owns the store, so progress takes the privileged path.
        let tracker = Arc::new(ProgressTracker::for_context(ExecutionContext::Privileged(
            store.clone(),
        )));
        let pipeline = Arc::new(AnalysisPipeline::new(
            store.clone(),
            collaborators.ocr,
            collaborators.extraction,
            Arc::new(DecisionEngine::new(completion)),
            tracker,
            config.call_policy,
        ));

        Self {
            config,
            store,
            llm_config,
            pipeline,
            qa: collaborators.qa,
            analysis_jobs: RwLock::new(HashMap::new()),
            analysis_tx: tx,
            analysis_rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    /// Take the analysis receiver (can only be called once, by the worker).
    pub fn take_analysis_rx(&self) -> Option<mpsc::UnboundedReceiver<AnalysisRequest>> {
        self.analysis_rx.lock().take()
    }

    /// Queue an analysis run. Returns `None` when the bill already has an
    /// active job.
    pub fn enqueue_analysis(&self, bill_id: &str, reanalyze: bool) -> Option<AnalysisJob> {
        let mut jobs = self.analysis_jobs.write();
        if jobs
            .values()
            .any(|j| j.bill_id == bill_id && j.status.is_active())
        {
            return None;
        }

        let job = AnalysisJob {
            id: uuid::Uuid::new_v4().to_string(),
            bill_id: bill_id.to_string(),
            reanalyze,
            status: JobStatus::Queued,
            report: None,
            error: None,
            queued_at: crate::analysis::now_millis(),
            started_at: None,
            completed_at: None,
        };
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);

        let request = AnalysisRequest {
            job_id: job.id.clone(),
            bill_id: bill_id.to_string(),
            reanalyze,
        };
        if self.analysis_tx.send(request).is_err() {
            tracing::error!("Analysis worker is not running; job {} stays queued", job.id);
        }
        Some(job)
    }
}
