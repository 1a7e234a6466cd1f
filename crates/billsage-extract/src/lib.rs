//! Bill extraction: OCR text in, [`StructuredBill`](billsage_core::StructuredBill) out.
//!
//! The remote extraction service does the heavy lifting; this crate builds
//! its instructions, cleans up what it returns, and provides an offline
//! fallback for when it is unreachable.

pub mod error;
pub mod instructions;
pub mod ocr;
pub mod offline;
pub mod orchestrator;
pub mod qa;

pub use error::ExtractionError;
pub use ocr::{HttpOcrService, OcrProgress, OcrService};
pub use offline::extract_offline;
pub use orchestrator::{ExtractOptions, ExtractionService, HttpExtractionService};
pub use qa::{HttpQaService, QaService};
