//! Store-level option and statistics types.

use serde::{Deserialize, Serialize};

/// Options for registering a new bill.
#[derive(Debug, Clone, Default)]
pub struct NewBill {
    /// Generated when absent.
    pub id: Option<String>,
    pub user_id: String,
    pub document_url: String,
    pub created_at: Option<i64>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_bills: i64,
    pub pending: i64,
    pub processing: i64,
    pub analyzed: i64,
    pub failed: i64,
    pub progress_records: i64,
    pub db_path: String,
}
