//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3010;
pub const DEFAULT_EXTRACTION_URL: &str = "http://localhost:5001/api/extract";
pub const DEFAULT_QA_URL: &str = "http://localhost:5001/api/qa";
pub const DEFAULT_OCR_URL: &str = "http://localhost:5002/api/ocr";
pub const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o";

/// Paths to all BillSage data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database directory (`data/db/`).
    pub db: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        std::fs::create_dir_all(&paths.db)?;
        Ok(paths)
    }
}

/// URLs of the external collaborators the pipeline talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub extraction_url: String,
    pub qa_url: String,
    pub ocr_url: String,
    /// Model identifier stamped into extraction metadata.
    pub extraction_model: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            extraction_url: DEFAULT_EXTRACTION_URL.into(),
            qa_url: DEFAULT_QA_URL.into(),
            ocr_url: DEFAULT_OCR_URL.into(),
            extraction_model: DEFAULT_EXTRACTION_MODEL.into(),
        }
    }
}

/// Timeout and retry policy applied to every external call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CallPolicy {
    pub timeout_secs: u64,
    /// Extra attempts after the first one fails with a transient error.
    pub retries: u32,
}

impl CallPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retries: 1,
        }
    }
}

/// Top-level BillSage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillSageConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub endpoints: ServiceEndpoints,
    pub call_policy: CallPolicy,
}

impl BillSageConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_parse("PORT").unwrap_or(DEFAULT_PORT);
        let data_paths = DataPaths::new(data_dir)?;

        let defaults = ServiceEndpoints::default();
        let endpoints = ServiceEndpoints {
            extraction_url: env_string("BILLSAGE_EXTRACTION_URL")
                .unwrap_or(defaults.extraction_url),
            qa_url: env_string("BILLSAGE_QA_URL").unwrap_or(defaults.qa_url),
            ocr_url: env_string("BILLSAGE_OCR_URL").unwrap_or(defaults.ocr_url),
            extraction_model: env_string("BILLSAGE_EXTRACTION_MODEL")
                .unwrap_or(defaults.extraction_model),
        };

        let policy_defaults = CallPolicy::default();
        let call_policy = CallPolicy {
            timeout_secs: nonzero_secs(
                "BILLSAGE_CALL_TIMEOUT_SECS",
                env_parse("BILLSAGE_CALL_TIMEOUT_SECS"),
            )
            .unwrap_or(policy_defaults.timeout_secs),
            retries: env_parse("BILLSAGE_CALL_RETRIES").unwrap_or(policy_defaults.retries),
        };

        Ok(Self {
            port,
            data_paths,
            endpoints,
            call_policy,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}; using default", key, raw);
            None
        }
    }
}

/// A zero timeout would expire every call immediately.
fn nonzero_secs(key: &str, value: Option<u64>) -> Option<u64> {
    match value {
        Some(0) => {
            tracing::warn!("Ignoring {}=0; using default", key);
            None
        }
        other => other,
    }
}
