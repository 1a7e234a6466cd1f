//! Ad-hoc questions over an already extracted bill.

use async_trait::async_trait;
use billsage_core::{ExtractionMode, StructuredBill};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

#[derive(Serialize)]
struct QaPayload<'a> {
    text: &'a str,
    /// The extracted bill, serialized as a JSON string.
    context: String,
    mode: ExtractionMode,
}

#[derive(Deserialize)]
struct QaResponse {
    answer: String,
}

#[async_trait]
pub trait QaService: Send + Sync {
    async fn ask(&self, question: &str, bill: &StructuredBill) -> Result<String, ExtractionError>;
}

pub struct HttpQaService {
    client: Client,
    url: String,
}

impl HttpQaService {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl QaService for HttpQaService {
    async fn ask(&self, question: &str, bill: &StructuredBill) -> Result<String, ExtractionError> {
        let payload = QaPayload {
            text: question,
            context: serde_json::to_string(bill).map_err(|e| ExtractionError::Parse(e.to_string()))?,
            mode: ExtractionMode::Qa,
        };

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

        let body: QaResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;
        Ok(body.answer)
    }
}
