//! BillSage Store: SQLite persistence for bills and progress records.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
