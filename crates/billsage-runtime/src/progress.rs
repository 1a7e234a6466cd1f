//! Per-bill progress tracking.
//!
//! One latest-wins record per bill. Where it is written depends on the
//! [`ExecutionContext`] the tracker is built with: a trusted server writes
//! straight to the store, anything else goes through the progress API.
//! Writes are best-effort; failures are logged and never reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use billsage_core::{Error, ProgressRecord, Result};
use billsage_store::SqliteStore;
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::types::Stage;

/// Storage for the single progress record of each bill.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert or overwrite the record for `bill_id`.
    async fn put(&self, bill_id: &str, record: &ProgressRecord) -> Result<()>;

    async fn get(&self, bill_id: &str) -> Result<Option<ProgressRecord>>;

    /// Remove the record. Removing an absent record is not an error.
    async fn delete(&self, bill_id: &str) -> Result<()>;
}

/// Privileged path: direct writes to the SQLite store.
pub struct StoreProgressRepository {
    store: Arc<SqliteStore>,
}

impl StoreProgressRepository {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProgressRepository for StoreProgressRepository {
    async fn put(&self, bill_id: &str, record: &ProgressRecord) -> Result<()> {
        self.store.put_progress(bill_id, record)
    }

    async fn get(&self, bill_id: &str) -> Result<Option<ProgressRecord>> {
        self.store.get_progress(bill_id)
    }

    async fn delete(&self, bill_id: &str) -> Result<()> {
        self.store.delete_progress(bill_id).map(|_| ())
    }
}

/// Unprivileged path: the server's `/api/bills/{id}/progress` endpoint.
pub struct HttpProgressRepository {
    client: Client,
    base_url: String,
}

impl HttpProgressRepository {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, bill_id: &str) -> String {
        format!("{}/api/bills/{}/progress", self.base_url, bill_id)
    }
}

fn persistence(e: impl std::fmt::Display) -> Error {
    Error::Persistence(e.to_string())
}

#[async_trait]
impl ProgressRepository for HttpProgressRepository {
    async fn put(&self, bill_id: &str, record: &ProgressRecord) -> Result<()> {
        let response = self
            .client
            .put(self.url(bill_id))
            .json(record)
            .send()
            .await
            .map_err(persistence)?;
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "progress write returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, bill_id: &str) -> Result<Option<ProgressRecord>> {
        let response = self
            .client
            .get(self.url(bill_id))
            .send()
            .await
            .map_err(persistence)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "progress read returned {}",
                response.status()
            )));
        }
        response
            .json::<ProgressRecord>()
            .await
            .map(Some)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    async fn delete(&self, bill_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(bill_id))
            .send()
            .await
            .map_err(persistence)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Error::Persistence(format!("progress delete returned {}", status)))
        }
    }
}

/// Where the tracker runs, and so which write path it uses.
pub enum ExecutionContext {
    /// Trusted server process with direct store access.
    Privileged(Arc<SqliteStore>),
    /// Client-side process that only reaches the server over HTTP.
    Unprivileged { client: Client, base_url: String },
}

pub struct ProgressTracker {
    repo: Arc<dyn ProgressRepository>,
}

impl ProgressTracker {
    pub fn new(repo: Arc<dyn ProgressRepository>) -> Self {
        Self { repo }
    }

    /// Pick the repository once, at construction.
    pub fn for_context(context: ExecutionContext) -> Self {
        let repo: Arc<dyn ProgressRepository> = match context {
            ExecutionContext::Privileged(store) => Arc::new(StoreProgressRepository::new(store)),
            ExecutionContext::Unprivileged { client, base_url } => {
                Arc::new(HttpProgressRepository::new(client, base_url))
            }
        };
        Self::new(repo)
    }

    /// Overwrite the record for `bill_id`. Never fails.
    pub async fn update(&self, bill_id: &str, stage: &str, percent: f64, message: &str) {
        let record = ProgressRecord::new(stage, percent, message);
        debug!("[{}] {} {:.0}%: {}", bill_id, stage, record.percent(), message);
        if let Err(e) = self.repo.put(bill_id, &record).await {
            error!("Progress write for {} failed: {}", bill_id, e);
        }
    }

    /// Report entry into a pipeline stage at its nominal percent.
    pub async fn enter(&self, bill_id: &str, stage: Stage, message: &str) {
        let percent = stage.start_percent().unwrap_or(0.0);
        self.update(bill_id, stage.label(), percent, message).await;
    }

    pub async fn initialize(&self, bill_id: &str) {
        self.enter(bill_id, Stage::Initializing, "Starting bill analysis process")
            .await;
    }

    /// Record a failed run at the percent it had reached.
    ///
    /// Capped below 100 so a failed run never reads as complete.
    pub async fn fail(&self, bill_id: &str, message: &str) {
        let last = match self.repo.get(bill_id).await {
            Ok(Some(record)) => record.percent(),
            Ok(None) => 0.0,
            Err(e) => {
                error!("Progress read for {} failed: {}", bill_id, e);
                0.0
            }
        };
        self.update(bill_id, Stage::Failed.label(), last.min(99.0), message)
            .await;
    }

    /// Remove the record. Absence is a valid terminal state.
    pub async fn clear(&self, bill_id: &str) {
        if let Err(e) = self.repo.delete(bill_id).await {
            error!("Progress delete for {} failed: {}", bill_id, e);
        }
    }

    /// Current record, or `None` when absent or unreadable.
    pub async fn current(&self, bill_id: &str) -> Option<ProgressRecord> {
        match self.repo.get(bill_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Progress read for {} failed: {}", bill_id, e);
                None
            }
        }
    }
}
