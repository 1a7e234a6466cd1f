//! SQLite-backed store for bills and their progress records.
//!
//! All writes are upserts or keyed updates, so re-running an analysis for
//! the same bill overwrites earlier state instead of duplicating it.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use billsage_core::{
    AnalysisResult, Bill, BillStatus, Error, ProgressRecord, Result, StructuredBill,
};

/// SQLite store shared by the pipeline and the HTTP layer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the SQLite store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/billsage.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("billsage.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let bill_count = store.count_bills(None)?;
        info!(
            "SqliteStore initialized: {} bills, path={}",
            bill_count,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Bill CRUD
    // ---------------------------------------------------------------

    /// Register an uploaded bill in `pending` state.
    pub fn create_bill(&self, new_bill: NewBill) -> Result<Bill> {
        let now = new_bill.created_at.unwrap_or_else(now_millis);
        let id = new_bill
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO bills (id, user_id, document_url, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id,
            new_bill.user_id,
            new_bill.document_url,
            BillStatus::Pending.as_str(),
            now
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);

        self.get_bill(&id)?
            .ok_or_else(|| Error::Internal(format!("Bill {} vanished after insert", id)))
    }

    /// Get a bill by ID.
    pub fn get_bill(&self, bill_id: &str) -> Result<Option<Bill>> {
        let conn = self.conn.lock();
        let bill = conn
            .prepare_cached("SELECT * FROM bills WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![bill_id], |row| Ok(Self::row_to_bill(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(bill)
    }

    /// List bills newest first, optionally restricted to one owner.
    pub fn list_bills(&self, user_id: Option<&str>) -> Result<Vec<Bill>> {
        let conn = self.conn.lock();
        let bills = match user_id {
            Some(uid) => {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT * FROM bills WHERE user_id = ?1 ORDER BY created_at DESC",
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(params![uid], |row| Ok(Self::row_to_bill(row)))
                    .map_err(|e| Error::Database(e.to_string()))?;
                rows.filter_map(|r| r.ok()).collect()
            }
            None => {
                let mut stmt = conn
                    .prepare_cached("SELECT * FROM bills ORDER BY created_at DESC")
                    .map_err(|e| Error::Database(e.to_string()))?;
                let rows = stmt
                    .query_map([], |row| Ok(Self::row_to_bill(row)))
                    .map_err(|e| Error::Database(e.to_string()))?;
                rows.filter_map(|r| r.ok()).collect()
            }
        };
        Ok(bills)
    }

    /// Delete a bill together with its progress record.
    pub fn delete_bill(&self, bill_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM bill_progress WHERE bill_id = ?1", params![bill_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        let count = conn
            .execute("DELETE FROM bills WHERE id = ?1", params![bill_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Move a bill into `processing` and clear any previous error.
    pub fn mark_processing(&self, bill_id: &str) -> Result<bool> {
        let now = now_millis();
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE bills SET status = ?1, error = NULL, analysis_started_at = ?2, \
                 updated_at = ?2 WHERE id = ?3",
                params![BillStatus::Processing.as_str(), now, bill_id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Overwrite the extracted structure of a bill.
    pub fn save_extraction(&self, bill_id: &str, extracted: &StructuredBill) -> Result<()> {
        let json = serde_json::to_string(extracted)?;
        self.update_checked(
            "UPDATE bills SET extracted_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, now_millis(), bill_id],
            bill_id,
        )
    }

    /// Attach the final analysis and mark the bill `analyzed`.
    pub fn complete_analysis(&self, bill_id: &str, analysis: &AnalysisResult) -> Result<()> {
        let json = serde_json::to_string(analysis)?;
        let now = now_millis();
        self.update_checked(
            "UPDATE bills SET analysis_json = ?1, status = ?2, error = NULL, \
             analyzed_at = ?3, updated_at = ?3 WHERE id = ?4",
            params![json, BillStatus::Analyzed.as_str(), now, bill_id],
            bill_id,
        )
    }

    /// Mark a bill `failed`, keeping whatever was extracted before the failure.
    pub fn mark_failed(&self, bill_id: &str, error: &str) -> Result<()> {
        self.update_checked(
            "UPDATE bills SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![BillStatus::Failed.as_str(), error, now_millis(), bill_id],
            bill_id,
        )
    }

    fn update_checked(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        bill_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let count = conn
            .execute(sql, params)
            .map_err(|e| Error::Database(e.to_string()))?;
        if count == 0 {
            return Err(Error::NotFound(format!("bill {}", bill_id)));
        }
        Ok(())
    }

    /// Count bills, optionally by status.
    pub fn count_bills(&self, status: Option<BillStatus>) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = match status {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM bills WHERE status = ?1",
                params![s.as_str()],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM bills", [], |row| row.get(0)),
        }
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Progress records
    // ---------------------------------------------------------------

    /// Write or overwrite the single progress record for a bill.
    pub fn put_progress(&self, bill_id: &str, record: &ProgressRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO bill_progress (bill_id, status, progress, stage, message, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(bill_id) DO UPDATE SET \
             status = excluded.status, progress = excluded.progress, stage = excluded.stage, \
             message = excluded.message, timestamp = excluded.timestamp",
        )
        .map_err(|e| Error::Persistence(e.to_string()))?
        .execute(params![
            bill_id,
            record.status.as_str(),
            record.progress,
            record.stage,
            record.message,
            record.timestamp
        ])
        .map_err(|e| Error::Persistence(e.to_string()))?;
        debug!(
            "Progress for {}: {} {:.0}%",
            bill_id,
            record.stage,
            record.percent()
        );
        Ok(())
    }

    pub fn get_progress(&self, bill_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached(
                "SELECT status, progress, stage, message, timestamp \
                 FROM bill_progress WHERE bill_id = ?1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![bill_id], |row| {
                let status: String = row.get(0)?;
                Ok(ProgressRecord {
                    status: status
                        .parse()
                        .unwrap_or(billsage_core::ProgressStatus::Processing),
                    progress: row.get(1)?,
                    stage: row.get(2)?,
                    message: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    /// Delete the progress record. Returns whether one existed.
    pub fn delete_progress(&self, bill_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM bill_progress WHERE bill_id = ?1", params![bill_id])
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn count_progress(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM bill_progress", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_bills: self.count_bills(None)?,
            pending: self.count_bills(Some(BillStatus::Pending))?,
            processing: self.count_bills(Some(BillStatus::Processing))?,
            analyzed: self.count_bills(Some(BillStatus::Analyzed))?,
            failed: self.count_bills(Some(BillStatus::Failed))?,
            progress_records: self.count_progress()?,
            db_path: self.db_path.to_string_lossy().to_string(),
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_bill(row: &rusqlite::Row<'_>) -> Bill {
        let status: String = row.get("status").unwrap_or_default();
        Bill {
            id: row.get("id").unwrap_or_default(),
            user_id: row.get("user_id").unwrap_or_default(),
            document_url: row.get("document_url").unwrap_or_default(),
            status: status.parse().unwrap_or(BillStatus::Pending),
            extracted: row
                .get::<_, Option<String>>("extracted_json")
                .ok()
                .flatten()
                .and_then(|s| serde_json::from_str(&s).ok()),
            analysis: row
                .get::<_, Option<String>>("analysis_json")
                .ok()
                .flatten()
                .and_then(|s| serde_json::from_str(&s).ok()),
            error: row.get("error").ok().flatten(),
            created_at: row.get("created_at").unwrap_or(0),
            updated_at: row.get("updated_at").unwrap_or(0),
            analysis_started_at: row.get("analysis_started_at").ok().flatten(),
            analyzed_at: row.get("analyzed_at").ok().flatten(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
