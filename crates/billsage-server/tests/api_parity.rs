//! API tests: drive the real router with mock collaborators and check the
//! response shapes the web client relies on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::RwLock;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use billsage_chat::{ChatError, CompletionClient, CompletionRequest, LLMConfig};
use billsage_core::{
    BillSageConfig, CallPolicy, DataPaths, ProgressStatus, Service, ServiceEndpoints,
    StructuredBill,
};
use billsage_extract::ocr::OcrProgressFn;
use billsage_extract::{
    ExtractOptions, ExtractionError, ExtractionService, OcrProgress, OcrService, QaService,
};
use billsage_runtime::{ExecutionContext, ProgressTracker};
use billsage_server::{analysis, build_router, AppState, Collaborators};
use billsage_store::{NewBill, SqliteStore};

// ---------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------

struct FixedOcr;

#[async_trait]
impl OcrService for FixedOcr {
    async fn recognize(
        &self,
        _document_url: &str,
        on_progress: OcrProgressFn<'_>,
    ) -> Result<String, ExtractionError> {
        on_progress(OcrProgress::new("recognizing text", 1.0, "done"));
        Ok("GENERAL HOSPITAL\nProfessional Fee $200.00".into())
    }
}

struct FixedExtraction;

#[async_trait]
impl ExtractionService for FixedExtraction {
    async fn extract(
        &self,
        _text: &str,
        _options: &ExtractOptions,
    ) -> Result<StructuredBill, ExtractionError> {
        let mut bill = StructuredBill::default();
        bill.bill_info.facility_type = Some("Hospital".into());
        bill.services = vec![
            Service::new("Professional Fee - Radiology"),
            Service::new("Operating Room Time"),
        ];
        Ok(bill)
    }
}

struct EchoQa;

#[async_trait]
impl QaService for EchoQa {
    async fn ask(&self, question: &str, bill: &StructuredBill) -> Result<String, ExtractionError> {
        Ok(format!("{} ({} services)", question, bill.services.len()))
    }
}

struct NoModel;

#[async_trait]
impl CompletionClient for NoModel {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, ChatError> {
        Err(ChatError::NotConfigured)
    }
}

// ---------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------

fn test_state(dir: &TempDir) -> Arc<AppState> {
    let data_paths = DataPaths::new(dir.path()).unwrap();
    let store = Arc::new(SqliteStore::open(&data_paths.db).unwrap());
    let llm_config = Arc::new(RwLock::new(LLMConfig::load(&data_paths.llm_config_file)));
    let config = BillSageConfig {
        port: 0,
        data_paths,
        endpoints: ServiceEndpoints::default(),
        call_policy: CallPolicy {
            timeout_secs: 5,
            retries: 0,
        },
    };
    let collaborators = Collaborators {
        ocr: Arc::new(FixedOcr),
        extraction: Arc::new(FixedExtraction),
        qa: Arc::new(EchoQa),
        completion: Arc::new(NoModel),
    };
    Arc::new(AppState::with_collaborators(
        config,
        store,
        llm_config,
        collaborators,
    ))
}

fn seed_bill(state: &AppState, id: &str) {
    state
        .store
        .create_bill(NewBill {
            id: Some(id.into()),
            user_id: "user-1".into(),
            document_url: "https://files/bill.png".into(),
            ..Default::default()
        })
        .unwrap();
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// ---------------------------------------------------------------
// Bills
// ---------------------------------------------------------------

#[tokio::test]
async fn test_bill_crud_shape() {
    let dir = TempDir::new().unwrap();
    let app = build_router(test_state(&dir));

    let (status, bill) = send(
        &app,
        "POST",
        "/api/bills",
        Some(serde_json::json!({ "userId": "user-1", "documentUrl": "https://files/a.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(bill["id"].is_string());
    assert_eq!(bill["userId"], "user-1");
    assert_eq!(bill["documentUrl"], "https://files/a.png");
    assert_eq!(bill["status"], "pending");
    assert!(bill["createdAt"].is_number());

    let id = bill["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(&app, "GET", &format!("/api/bills/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id.as_str());

    let (status, list) = send(&app, "GET", "/api/bills?userId=user-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert!(list["bills"].is_array());

    let (_, other) = send(&app, "GET", "/api/bills?userId=someone-else", None).await;
    assert_eq!(other["total"], 0);

    let (status, _) = send(&app, "DELETE", &format!("/api/bills/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "GET", &format!("/api/bills/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_create_bill_requires_fields() {
    let dir = TempDir::new().unwrap();
    let app = build_router(test_state(&dir));

    let (status, body) = send(
        &app,
        "POST",
        "/api/bills",
        Some(serde_json::json!({ "userId": "", "documentUrl": "https://files/a.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ---------------------------------------------------------------
// Progress
// ---------------------------------------------------------------

#[tokio::test]
async fn test_progress_put_recomputes_status() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-1");
    let app = build_router(state);

    let (status, record) = send(
        &app,
        "PUT",
        "/api/bills/bill-1/progress",
        Some(serde_json::json!({
            "status": "processing",
            "progress": 1.0,
            "stage": "Complete",
            "message": "Analysis complete",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "complete");

    let (status, record) = send(&app, "GET", "/api/bills/bill-1/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "complete");
    assert_eq!(record["progress"], 1.0);
    assert_eq!(record["stage"], "Complete");
    assert!(record["timestamp"].is_string());

    let (status, _) = send(&app, "DELETE", "/api/bills/bill-1/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/api/bills/bill-1/progress", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_progress_put_without_bill_row() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let app = build_router(state.clone());

    let (status, record) = send(
        &app,
        "PUT",
        "/api/bills/unregistered/progress",
        Some(serde_json::json!({ "progress": 0.1, "stage": "OCR", "message": "m" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["stage"], "OCR");

    let stored = state.store.get_progress("unregistered").unwrap().unwrap();
    assert_eq!(stored.progress, 0.1);
}

/// Both execution contexts store the same thing for a bill with no row.
#[tokio::test]
async fn test_progress_contexts_interchangeable() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let privileged =
        ProgressTracker::for_context(ExecutionContext::Privileged(state.store.clone()));
    let unprivileged = ProgressTracker::for_context(ExecutionContext::Unprivileged {
        client: reqwest::Client::new(),
        base_url: format!("http://{}", addr),
    });

    for (tracker, bill_id) in [(&privileged, "bill-123"), (&unprivileged, "bill-456")] {
        tracker.initialize(bill_id).await;
        tracker.update(bill_id, "Complete", 100.0, "done").await;

        let record = tracker.current(bill_id).await.unwrap();
        assert_eq!(record.stage, "Complete");
        assert_eq!(record.progress, 1.0);
        assert_eq!(record.status, ProgressStatus::Complete);
        assert!(state.store.get_bill(bill_id).unwrap().is_none());
    }

    let direct = state.store.get_progress("bill-123").unwrap().unwrap();
    let remote = state.store.get_progress("bill-456").unwrap().unwrap();
    assert_eq!(direct.status, remote.status);
    assert_eq!(direct.message, remote.message);
}

/// A tracker on the unprivileged path writes through a live server.
#[tokio::test]
async fn test_http_progress_round_trip() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-9");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let tracker = ProgressTracker::for_context(ExecutionContext::Unprivileged {
        client: reqwest::Client::new(),
        base_url: format!("http://{}", addr),
    });

    tracker.initialize("bill-9").await;
    let record = tracker.current("bill-9").await.unwrap();
    assert_eq!(record.stage, "Initializing");
    assert_eq!(record.progress, 0.05);
    assert_eq!(record.status, ProgressStatus::Processing);

    // Same record is visible to the privileged side.
    let stored = state.store.get_progress("bill-9").unwrap().unwrap();
    assert_eq!(stored.message, "Starting bill analysis process");

    tracker.update("bill-9", "Extracting", 50.0, "Extracting").await;
    tracker.fail("bill-9", "Extraction service unreachable").await;
    let record = tracker.current("bill-9").await.unwrap();
    assert_eq!(record.stage, "Failed");
    assert_eq!(record.progress, 0.5);

    tracker.update("bill-9", "Complete", 100.0, "done").await;
    let record = tracker.current("bill-9").await.unwrap();
    assert_eq!(record.status, ProgressStatus::Complete);

    tracker.clear("bill-9").await;
    assert!(tracker.current("bill-9").await.is_none());
    tracker.clear("bill-9").await;
}

// ---------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------

#[tokio::test]
async fn test_analyze_runs_in_background() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-1");
    analysis::start_analysis_worker(state.clone());
    let app = build_router(state);

    let (status, queued) = send(&app, "POST", "/api/bills/bill-1/analyze", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(queued["billId"], "bill-1");
    let job_id = queued["jobId"].as_str().unwrap().to_string();

    let mut job = Value::Null;
    for _ in 0..50 {
        let (_, current) = send(&app, "GET", &format!("/api/analysis/jobs/{}", job_id), None).await;
        if current["status"] == "completed" || current["status"] == "failed" {
            job = current;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(job["status"], "completed", "job: {}", job);
    assert_eq!(job["report"]["services"], 2);
    assert_eq!(job["report"]["extractionSource"], "remote");

    let (_, bill) = send(&app, "GET", "/api/bills/bill-1", None).await;
    assert_eq!(bill["status"], "analyzed");
    let services = bill["analysis"]["services"].as_array().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0]["decision"]["componentType"], "professional");
    assert_eq!(services[0]["decision"]["tier"], "rule");
    assert_eq!(services[1]["decision"]["componentType"], "facility");

    let (_, progress) = send(&app, "GET", "/api/bills/bill-1/progress", None).await;
    assert_eq!(progress["stage"], "Complete");
    assert_eq!(progress["status"], "complete");

    let (_, summary) = send(&app, "GET", "/api/analysis/status", None).await;
    assert_eq!(summary["completed"], 1);
    assert_eq!(summary["total"], 1);
}

#[tokio::test]
async fn test_analyze_unknown_bill() {
    let dir = TempDir::new().unwrap();
    let app = build_router(test_state(&dir));

    let (status, _) = send(&app, "POST", "/api/bills/missing/analyze", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_enqueue_rejected_while_active() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-1");
    // No worker: the first job stays queued.
    let app = build_router(state.clone());

    let (status, _) = send(
        &app,
        "POST",
        "/api/bills/bill-1/analyze",
        Some(serde_json::json!({ "reanalyze": true })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(&app, "POST", "/api/bills/bill-1/analyze", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, jobs) = send(&app, "GET", "/api/analysis/jobs", None).await;
    assert_eq!(jobs["total"], 1);
    assert_eq!(jobs["jobs"][0]["status"], "queued");
    assert_eq!(jobs["jobs"][0]["reanalyze"], true);
}

// ---------------------------------------------------------------
// QA, classify, config, stats
// ---------------------------------------------------------------

#[tokio::test]
async fn test_qa_requires_extraction() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-1");
    let app = build_router(state.clone());

    let question = serde_json::json!({ "question": "What is the total?" });
    let (status, _) = send(&app, "POST", "/api/bills/bill-1/qa", Some(question.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut extracted = StructuredBill::default();
    extracted.services.push(Service::new("Office visit"));
    state.store.save_extraction("bill-1", &extracted).unwrap();

    let (status, body) = send(&app, "POST", "/api/bills/bill-1/qa", Some(question)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "What is the total? (1 services)");
}

#[tokio::test]
async fn test_classify_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = build_router(test_state(&dir));

    let (status, body) = send(
        &app,
        "POST",
        "/api/classify",
        Some(serde_json::json!({
            "service": { "description": "CT Scan" },
            "context": { "facilityType": "Hospital Outpatient Department" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"]["componentType"], "facility");
    assert_eq!(body["decision"]["database"], "OPPS");
    assert_eq!(body["decision"]["tier"], "context");
    assert_eq!(body["tiers"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_llm_config_shape() {
    let dir = TempDir::new().unwrap();
    let app = build_router(test_state(&dir));

    let (status, config) = send(&app, "GET", "/api/llm/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(config["preferredProvider"].is_string());
    assert!(config["classificationTemperature"].is_number());
    assert_eq!(config["providers"].as_array().unwrap().len(), 3);

    let (status, updated) = send(
        &app,
        "PUT",
        "/api/llm/config",
        Some(serde_json::json!({
            "preferredProvider": "groq",
            "providers": [{ "provider": "groq", "apiKey": "gsk-secret" }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["activeProvider"], "groq");
    assert!(!updated.to_string().contains("gsk-secret"));
    assert!(dir.path().join("llm-config.json").exists());
}

#[tokio::test]
async fn test_stats_shape() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    seed_bill(&state, "bill-1");
    let app = build_router(state);

    let (status, stats) = send(&app, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["bills"], 1);
    assert_eq!(stats["byStatus"]["pending"], 1);
    assert!(stats["analysisQueue"]["queued"].is_number());
}
