//! OCR collaborator: document URL in, text out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::ExtractionError;

/// Progress reported by the OCR service while it works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrProgress {
    pub status: String,
    /// Fraction 0.0–1.0.
    pub progress: f64,
    pub message: String,
}

impl OcrProgress {
    pub fn new(status: impl Into<String>, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }
}

pub type OcrProgressFn<'a> = &'a (dyn Fn(OcrProgress) + Send + Sync);

#[async_trait]
pub trait OcrService: Send + Sync {
    async fn recognize(
        &self,
        document_url: &str,
        on_progress: OcrProgressFn<'_>,
    ) -> Result<String, ExtractionError>;
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

/// Posts `{url}` to the OCR endpoint and reads `{text}` back.
pub struct HttpOcrService {
    client: Client,
    url: String,
}

impl HttpOcrService {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn recognize(
        &self,
        document_url: &str,
        on_progress: OcrProgressFn<'_>,
    ) -> Result<String, ExtractionError> {
        on_progress(OcrProgress::new("recognizing", 0.0, "Sending document to OCR"));
        debug!("OCR request for {}", document_url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "url": document_url }))
            .send()
            .await
            .map_err(ExtractionError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(ExtractionError::from_response(response).await);
        }

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        on_progress(OcrProgress::new(
            "done",
            1.0,
            format!("Recognized {} characters", body.text.len()),
        ));
        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use parking_lot::Mutex;
    use serde_json::Value;

    #[tokio::test]
    async fn test_http_ocr_reports_progress() {
        let router = Router::new().route(
            "/api/ocr",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "text": format!("text of {}", body["url"].as_str().unwrap_or("")) }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let service = HttpOcrService::new(Client::new(), format!("http://{}/api/ocr", addr));
        let events = Mutex::new(Vec::new());
        let text = service
            .recognize("https://files/bill.png", &|p: OcrProgress| events.lock().push(p))
            .await
            .unwrap();

        assert_eq!(text, "text of https://files/bill.png");
        let events = events.into_inner();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].progress, 0.0);
        assert_eq!(events[1].progress, 1.0);
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(OcrProgress::new("x", 3.0, "m").progress, 1.0);
    }
}
