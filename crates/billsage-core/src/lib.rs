//! BillSage Core: configuration, error taxonomy, bill data model.

pub mod bill;
pub mod config;
pub mod error;
pub mod progress;

pub use bill::*;
pub use config::{BillSageConfig, CallPolicy, DataPaths, ServiceEndpoints};
pub use error::{Error, Result};
pub use progress::{ProgressRecord, ProgressStatus};
