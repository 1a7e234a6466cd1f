//! Remote extraction call plus post-processing.

use async_trait::async_trait;
use billsage_core::{AnalysisMetadata, ExtractionMode, StructuredBill, NOT_FOUND};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::instructions::build_instructions;

pub const MAX_PATIENT_NAME_CHARS: usize = 30;

static NAME_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:number|dob|date|account|id)\b|#").unwrap());

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub mode: ExtractionMode,
    /// Prior extraction of the same document, enabling enhanced instructions.
    pub previous_results: Option<Value>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Extract,
            previous_results: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionPayload<'a> {
    text: &'a str,
    mode: ExtractionMode,
    instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_results: Option<&'a Value>,
}

/// Turns document text into a structured bill.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
    ) -> Result<StructuredBill, ExtractionError>;
}

pub struct HttpExtractionService {
    client: Client,
    url: String,
    model: String,
}

impl HttpExtractionService {
    pub fn new(client: Client, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
    ) -> Result<StructuredBill, ExtractionError> {
        let payload = ExtractionPayload {
            text,
            mode: options.mode,
            instructions: build_instructions(options.previous_results.as_ref()),
            previous_results: options.previous_results.as_ref(),
        };
        debug!(
            "Extraction request: {} chars, mode {}, previous results: {}",
            text.len(),
            options.mode,
            options.previous_results.is_some()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(ExtractionError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(ExtractionError::from_response(response).await);
        }

        let mut bill: StructuredBill = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        post_process(&mut bill, &self.model, text.len(), options);
        info!(
            "Extracted {} services (patient: {})",
            bill.services.len(),
            if bill.patient_info.full_name == NOT_FOUND { "not found" } else { "found" }
        );
        Ok(bill)
    }
}

/// Clean the patient name and stamp provenance metadata.
pub fn post_process(
    bill: &mut StructuredBill,
    model: &str,
    text_length: usize,
    options: &ExtractOptions,
) {
    bill.patient_info.full_name = clean_patient_name(&bill.patient_info.full_name);
    bill.analysis_metadata = Some(AnalysisMetadata {
        timestamp: chrono::Utc::now().to_rfc3339(),
        model: model.to_string(),
        text_length,
        mode: options.mode,
        used_previous_results: options.previous_results.is_some(),
    });
}

/// Truncate a name at the first label token the model echoed into it and
/// cap its length.
pub fn clean_patient_name(raw: &str) -> String {
    let head = match NAME_SEPARATOR_RE.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };
    let trimmed = head
        .trim()
        .trim_end_matches(|c: char| c == ':' || c == ',' || c == '-' || c.is_whitespace());
    let capped: String = trimmed.chars().take(MAX_PATIENT_NAME_CHARS).collect();
    let capped = capped.trim_end().to_string();

    if capped.is_empty() {
        NOT_FOUND.to_string()
    } else {
        capped
    }
}
