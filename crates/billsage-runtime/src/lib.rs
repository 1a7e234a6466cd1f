//! Runtime: the bill analysis pipeline and the progress tracker around it.
//!
//! Drives OCR, extraction, per-service classification and persistence for
//! one bill, publishing a latest-wins progress record at every stage.

pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod types;

pub use pipeline::AnalysisPipeline;
pub use policy::{call_with_policy, PolicyCompletionClient};
pub use progress::{
    ExecutionContext, HttpProgressRepository, ProgressRepository, ProgressTracker,
    StoreProgressRepository,
};
pub use types::*;
