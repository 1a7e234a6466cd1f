use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The service answered with a non-2xx status.
    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Could not parse service response: {0}")]
    Parse(String),
}

impl ExtractionError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExtractionError::Parse(e.to_string())
        } else {
            ExtractionError::Request(e.to_string())
        }
    }

    /// Build a `Service` error from a failed response, preferring its
    /// `{"error": ...}` field over the raw body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(|s| s.to_string()))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body
                }
            });
        ExtractionError::Service { status, message }
    }
}

impl From<ExtractionError> for billsage_core::Error {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Parse(msg) => billsage_core::Error::Parse(msg),
            other => billsage_core::Error::ExternalCall(other.to_string()),
        }
    }
}
