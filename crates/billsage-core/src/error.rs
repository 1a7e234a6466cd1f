//! Error types for BillSage.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// OCR, extraction or model call failed (network error or non-2xx status).
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// A collaborator answered with a body we could not interpret.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Progress record or bill write failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry of the same external call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ExternalCall(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
