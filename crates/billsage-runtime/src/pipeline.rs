//! Bill analysis pipeline: OCR → extraction → classification → persistence.

use std::sync::Arc;
use std::time::Instant;

use billsage_classify::DecisionEngine;
use billsage_core::{
    AnalysisResult, AnalysisSummary, Bill, BillContext, CallPolicy, Error, ExtractionMode,
    ExtractionSource, PricingDatabase, Result, StructuredBill,
};
use billsage_extract::{extract_offline, ExtractOptions, ExtractionService, OcrProgress, OcrService};
use billsage_store::SqliteStore;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::policy::call_with_policy;
use crate::progress::ProgressTracker;
use crate::types::{band_percent, RunReport, Stage, CLASSIFY_END_PERCENT, OCR_END_PERCENT};

/// Runs one bill at a time through every stage. Runs for different bills
/// may proceed concurrently on the same pipeline.
pub struct AnalysisPipeline {
    store: Arc<SqliteStore>,
    ocr: Arc<dyn OcrService>,
    extraction: Arc<dyn ExtractionService>,
    engine: Arc<DecisionEngine>,
    tracker: Arc<ProgressTracker>,
    policy: CallPolicy,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<SqliteStore>,
        ocr: Arc<dyn OcrService>,
        extraction: Arc<dyn ExtractionService>,
        engine: Arc<DecisionEngine>,
        tracker: Arc<ProgressTracker>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            store,
            ocr,
            extraction,
            engine,
            tracker,
            policy,
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    /// Analyze a bill end to end.
    ///
    /// With `reanalyze`, the bill's previous extraction is handed to the
    /// extraction service as `previousResults`. On failure the bill is
    /// marked `failed` and the progress record is left at stage `Failed`.
    pub async fn analyze(&self, bill_id: &str, reanalyze: bool) -> Result<RunReport> {
        let started = Instant::now();
        let bill = self
            .store
            .get_bill(bill_id)?
            .ok_or_else(|| Error::NotFound(format!("bill {}", bill_id)))?;

        self.tracker.initialize(bill_id).await;

        match self.start_run(bill_id, &bill, reanalyze).await {
            Ok(result) => {
                let report = RunReport {
                    bill_id: bill_id.to_string(),
                    run_id: result.run_id.clone(),
                    extraction_source: result.extraction_source,
                    services: result.services.len(),
                    low_confidence: result.summary.low_confidence,
                    facility_services: RunReport::count_database(&result, PricingDatabase::Opps),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    "Analyzed bill {}: {} services ({} low confidence) in {}ms",
                    bill_id, report.services, report.low_confidence, report.duration_ms
                );
                Ok(report)
            }
            Err(e) => {
                error!("Analysis of bill {} failed: {}", bill_id, e);
                if let Err(mark_err) = self.store.mark_failed(bill_id, &e.to_string()) {
                    error!("Could not mark bill {} failed: {}", bill_id, mark_err);
                }
                self.tracker
                    .fail(bill_id, &format!("Analysis failed: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn start_run(
        &self,
        bill_id: &str,
        bill: &Bill,
        reanalyze: bool,
    ) -> Result<AnalysisResult> {
        if !self.store.mark_processing(bill_id)? {
            return Err(Error::NotFound(format!("bill {}", bill_id)));
        }

        let previous = if reanalyze {
            bill.extracted
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?
        } else {
            None
        };

        self.run_stages(bill_id, &bill.document_url, previous).await
    }

    async fn run_stages(
        &self,
        bill_id: &str,
        document_url: &str,
        previous: Option<serde_json::Value>,
    ) -> Result<AnalysisResult> {
        let text = self.recognize(bill_id, document_url).await?;

        let (structured, source) = self.extract(bill_id, &text, previous).await;
        self.store.save_extraction(bill_id, &structured)?;

        let context = BillContext::from_bill(&structured);
        let total = structured.services.len();
        self.tracker
            .enter(
                bill_id,
                Stage::Classifying,
                &format!("Classifying {} services", total),
            )
            .await;

        let tracker = &self.tracker;
        let start = Stage::Classifying.start_percent().unwrap_or(60.0);
        // Counts can finish out of order; only a higher count is reported.
        let reported = &tokio::sync::Mutex::new(0usize);
        let services = self
            .engine
            .decide_all_with(&structured.services, &context, |done| async move {
                let mut last = reported.lock().await;
                if done <= *last {
                    return;
                }
                *last = done;
                let percent = band_percent(start, CLASSIFY_END_PERCENT, done as f64 / total as f64);
                tracker
                    .update(
                        bill_id,
                        Stage::Classifying.label(),
                        percent,
                        &format!("Classified {} of {} services", done, total),
                    )
                    .await;
            })
            .await;

        self.tracker
            .enter(bill_id, Stage::Saving, "Saving analysis results")
            .await;
        let result = AnalysisResult {
            run_id: uuid::Uuid::new_v4().to_string(),
            extraction_source: source,
            summary: AnalysisSummary::from_services(&services),
            services,
            completed_at: chrono::Utc::now().timestamp_millis(),
        };
        self.store.complete_analysis(bill_id, &result)?;

        self.tracker
            .enter(bill_id, Stage::Complete, "Bill analysis complete")
            .await;
        Ok(result)
    }

    /// OCR with the service's progress callback mapped into the OCR band.
    async fn recognize(&self, bill_id: &str, document_url: &str) -> Result<String> {
        self.tracker
            .enter(bill_id, Stage::Ocr, "Extracting text from document")
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<OcrProgress>();
        let ocr = async move {
            let on_progress = move |p: OcrProgress| {
                let _ = tx.send(p);
            };
            call_with_policy(&self.policy, "OCR", || {
                self.ocr.recognize(document_url, &on_progress)
            })
            .await
        };
        let forward = async {
            let start = Stage::Ocr.start_percent().unwrap_or(10.0);
            while let Some(p) = rx.recv().await {
                let percent = band_percent(start, OCR_END_PERCENT, p.progress);
                self.tracker
                    .update(bill_id, Stage::Ocr.label(), percent, &p.message)
                    .await;
            }
        };

        let (text, ()) = tokio::join!(ocr, forward);
        let text = text?;
        if text.trim().is_empty() {
            return Err(Error::Parse("OCR returned no text".into()));
        }
        Ok(text)
    }

    /// Remote extraction, falling back to the offline routine on failure.
    async fn extract(
        &self,
        bill_id: &str,
        text: &str,
        previous: Option<serde_json::Value>,
    ) -> (StructuredBill, ExtractionSource) {
        let message = if previous.is_some() {
            "Re-extracting billing details with previous results"
        } else {
            "Extracting billing details"
        };
        self.tracker.enter(bill_id, Stage::Extracting, message).await;

        let options = ExtractOptions {
            mode: ExtractionMode::Extract,
            previous_results: previous,
        };
        match call_with_policy(&self.policy, "Extraction", || {
            self.extraction.extract(text, &options)
        })
        .await
        {
            Ok(structured) => (structured, ExtractionSource::Remote),
            Err(e) => {
                warn!(
                    "Extraction service failed for bill {} ({}); using offline extraction",
                    bill_id, e
                );
                (extract_offline(text), ExtractionSource::Offline)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use billsage_chat::{ChatError, CompletionClient, CompletionRequest};
    use billsage_core::{
        BillStatus, ComponentType, DecisionTier, ProgressRecord, ProgressStatus, Service,
    };
    use billsage_extract::{ocr::OcrProgressFn, ExtractionError};
    use billsage_store::NewBill;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::progress::{ProgressRepository, StoreProgressRepository};

    struct FixedOcr {
        text: Option<&'static str>,
    }

    #[async_trait]
    impl OcrService for FixedOcr {
        async fn recognize(
            &self,
            _document_url: &str,
            on_progress: OcrProgressFn<'_>,
        ) -> std::result::Result<String, ExtractionError> {
            on_progress(OcrProgress::new("recognizing", 0.5, "halfway"));
            self.text
                .map(|t| t.to_string())
                .ok_or_else(|| ExtractionError::Parse("unreadable image".into()))
        }
    }

    struct ScriptedExtraction {
        bill: Option<StructuredBill>,
        seen_previous: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl ExtractionService for ScriptedExtraction {
        async fn extract(
            &self,
            _text: &str,
            options: &ExtractOptions,
        ) -> std::result::Result<StructuredBill, ExtractionError> {
            self.seen_previous
                .lock()
                .push(options.previous_results.is_some());
            self.bill.clone().ok_or_else(|| ExtractionError::Service {
                status: 503,
                message: "unavailable".into(),
            })
        }
    }

    struct NoModel;

    #[async_trait]
    impl CompletionClient for NoModel {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<String, ChatError> {
            Err(ChatError::NotConfigured)
        }
    }

    /// Store-backed repository that keeps every write it sees.
    struct RecordingRepository {
        store: Arc<SqliteStore>,
        inner: StoreProgressRepository,
        writes: Mutex<Vec<(String, f64)>>,
        remove_bill_on_first_write: bool,
    }

    impl RecordingRepository {
        fn percents(&self) -> Vec<f64> {
            self.writes.lock().iter().map(|(_, p)| *p).collect()
        }
    }

    #[async_trait]
    impl ProgressRepository for RecordingRepository {
        async fn put(&self, bill_id: &str, record: &ProgressRecord) -> Result<()> {
            let first = {
                let mut writes = self.writes.lock();
                writes.push((record.stage.clone(), record.percent().round()));
                writes.len() == 1
            };
            if first && self.remove_bill_on_first_write {
                self.store.delete_bill(bill_id)?;
            }
            self.inner.put(bill_id, record).await
        }

        async fn get(&self, bill_id: &str) -> Result<Option<ProgressRecord>> {
            self.inner.get(bill_id).await
        }

        async fn delete(&self, bill_id: &str) -> Result<()> {
            self.inner.delete(bill_id).await
        }
    }

    fn sample_bill() -> StructuredBill {
        let mut bill = StructuredBill::default();
        bill.bill_info.facility_type = Some("Hospital Outpatient Department".into());
        bill.services = vec![
            Service::new("Professional Fee - Radiology Interpretation"),
            Service::new("Facility Fee - ER Visit"),
            Service::new("CT Scan"),
        ];
        bill
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteStore>,
        extraction: Arc<ScriptedExtraction>,
        progress: Arc<RecordingRepository>,
        pipeline: AnalysisPipeline,
    }

    fn fixture(ocr_text: Option<&'static str>, extracted: Option<StructuredBill>) -> Fixture {
        fixture_with(ocr_text, extracted, false)
    }

    fn fixture_with(
        ocr_text: Option<&'static str>,
        extracted: Option<StructuredBill>,
        remove_bill_on_first_write: bool,
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        store
            .create_bill(NewBill {
                id: Some("bill-1".into()),
                user_id: "user-1".into(),
                document_url: "https://files/bill.png".into(),
                ..Default::default()
            })
            .unwrap();

        let extraction = Arc::new(ScriptedExtraction {
            bill: extracted,
            seen_previous: Mutex::new(Vec::new()),
        });
        let progress = Arc::new(RecordingRepository {
            store: store.clone(),
            inner: StoreProgressRepository::new(store.clone()),
            writes: Mutex::new(Vec::new()),
            remove_bill_on_first_write,
        });
        let tracker = Arc::new(ProgressTracker::new(progress.clone()));
        let pipeline = AnalysisPipeline::new(
            store.clone(),
            Arc::new(FixedOcr { text: ocr_text }),
            extraction.clone(),
            Arc::new(DecisionEngine::new(Arc::new(NoModel))),
            tracker,
            CallPolicy {
                timeout_secs: 5,
                retries: 0,
            },
        );
        Fixture {
            _dir: dir,
            store,
            extraction,
            progress,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_full_run() {
        let f = fixture(Some("BILL TEXT"), Some(sample_bill()));
        let report = f.pipeline.analyze("bill-1", false).await.unwrap();
        assert_eq!(report.services, 3);
        assert_eq!(report.extraction_source, ExtractionSource::Remote);
        assert_eq!(report.facility_services, 2);

        let bill = f.store.get_bill("bill-1").unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Analyzed);
        let analysis = bill.analysis.unwrap();
        let decisions: Vec<_> = analysis.services.iter().map(|s| &s.decision).collect();
        assert_eq!(decisions[0].component_type, ComponentType::Professional);
        assert_eq!(decisions[0].tier, DecisionTier::Rule);
        assert_eq!(decisions[1].component_type, ComponentType::Facility);
        assert_eq!(decisions[2].tier, DecisionTier::Context);
        assert_eq!(analysis.services[2].service.description, "CT Scan");

        let progress = f.store.get_progress("bill-1").unwrap().unwrap();
        assert_eq!(progress.stage, "Complete");
        assert_eq!(progress.status, ProgressStatus::Complete);
        assert_eq!(progress.progress, 1.0);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let f = fixture(Some("BILL TEXT"), Some(sample_bill()));
        f.pipeline.analyze("bill-1", false).await.unwrap();

        let first_run = f.progress.percents();
        assert_eq!(first_run.first(), Some(&5.0));
        assert_eq!(first_run.last(), Some(&100.0));
        assert!(first_run.windows(2).all(|w| w[0] <= w[1]), "{:?}", first_run);
        for expected in [10.0, 25.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0] {
            assert!(first_run.contains(&expected), "missing {} in {:?}", expected, first_run);
        }

        f.progress.writes.lock().clear();
        f.pipeline.analyze("bill-1", true).await.unwrap();
        let second_run = f.progress.percents();
        assert_eq!(second_run.first(), Some(&5.0));
        assert!(second_run.windows(2).all(|w| w[0] <= w[1]), "{:?}", second_run);
        assert_eq!(second_run.last(), Some(&100.0));
    }

    #[tokio::test]
    async fn test_failed_start_is_recorded() {
        let f = fixture_with(Some("BILL TEXT"), Some(sample_bill()), true);
        let err = f.pipeline.analyze("bill-1", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let progress = f.store.get_progress("bill-1").unwrap().unwrap();
        assert_eq!(progress.stage, "Failed");
        assert_eq!(progress.percent().round(), 5.0);
        assert!(f.extraction.seen_previous.lock().is_empty());
    }

    #[tokio::test]
    async fn test_offline_fallback() {
        let f = fixture(Some("74177 CT ABDOMEN $450.00"), None);
        let report = f.pipeline.analyze("bill-1", false).await.unwrap();
        assert_eq!(report.extraction_source, ExtractionSource::Offline);
        assert_eq!(report.services, 1);

        let bill = f.store.get_bill("bill-1").unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Analyzed);
        let service = &bill.analysis.unwrap().services[0];
        assert_eq!(service.decision.tier, DecisionTier::ErrorDefault);
        assert_eq!(service.service.code.as_deref(), Some("74177"));
    }

    #[tokio::test]
    async fn test_ocr_failure_marks_failed() {
        let f = fixture(None, Some(sample_bill()));
        assert!(f.pipeline.analyze("bill-1", false).await.is_err());

        let bill = f.store.get_bill("bill-1").unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Failed);
        assert!(bill.error.unwrap().contains("unreadable image"));

        let progress = f.store.get_progress("bill-1").unwrap().unwrap();
        assert_eq!(progress.stage, "Failed");
        assert_eq!(progress.status, ProgressStatus::Processing);
        assert!(f.extraction.seen_previous.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reanalysis_passes_previous_results() {
        let f = fixture(Some("BILL TEXT"), Some(sample_bill()));
        let first = f.pipeline.analyze("bill-1", false).await.unwrap();
        let second = f.pipeline.analyze("bill-1", true).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(*f.extraction.seen_previous.lock(), vec![false, true]);
        assert_eq!(f.store.count_progress().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_bill() {
        let f = fixture(Some("BILL TEXT"), Some(sample_bill()));
        let err = f.pipeline.analyze("missing", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(f.store.get_progress("missing").unwrap().is_none());
    }
}
