//! Runtime types.

use billsage_core::{ExtractionSource, PricingDatabase};
use serde::Serialize;

/// Named pipeline stages with the percent reported on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Initializing,
    Ocr,
    Extracting,
    Classifying,
    Saving,
    Complete,
    Failed,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::Ocr => "OCR",
            Stage::Extracting => "Extracting",
            Stage::Classifying => "Classifying",
            Stage::Saving => "Saving",
            Stage::Complete => "Complete",
            Stage::Failed => "Failed",
        }
    }

    /// Percent reported when the stage starts. `Failed` keeps whatever
    /// percent the run had reached.
    pub fn start_percent(&self) -> Option<f64> {
        match self {
            Stage::Initializing => Some(5.0),
            Stage::Ocr => Some(10.0),
            Stage::Extracting => Some(50.0),
            Stage::Classifying => Some(60.0),
            Stage::Saving => Some(95.0),
            Stage::Complete => Some(100.0),
            Stage::Failed => None,
        }
    }
}

/// Upper end of the OCR band; OCR callback fractions map into 10..40.
pub const OCR_END_PERCENT: f64 = 40.0;
/// Upper end of the classification band (60..90).
pub const CLASSIFY_END_PERCENT: f64 = 90.0;

/// Map a fraction of work done within a stage onto its percent band.
pub fn band_percent(start: f64, end: f64, fraction: f64) -> f64 {
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    start + (end - start) * fraction
}

/// Short summary of a finished run, logged and returned to job tables.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(rename = "billId")]
    pub bill_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "extractionSource")]
    pub extraction_source: ExtractionSource,
    pub services: usize,
    #[serde(rename = "lowConfidence")]
    pub low_confidence: usize,
    #[serde(rename = "facilityServices")]
    pub facility_services: usize,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

impl RunReport {
    pub fn count_database(result: &billsage_core::AnalysisResult, db: PricingDatabase) -> usize {
        result
            .services
            .iter()
            .filter(|s| s.decision.database == db)
            .count()
    }
}
