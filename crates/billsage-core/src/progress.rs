//! Progress record shape shared by every progress write path.

use serde::{Deserialize, Serialize};

/// Percent at which a run counts as finished.
pub const COMPLETE_PERCENT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Complete,
}

impl ProgressStatus {
    /// `complete` exactly at 100%, `processing` everywhere else.
    pub fn for_percent(percent: f64) -> Self {
        if percent >= COMPLETE_PERCENT {
            ProgressStatus::Complete
        } else {
            ProgressStatus::Processing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Processing => "processing",
            ProgressStatus::Complete => "complete",
        }
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ProgressStatus::Processing),
            "complete" => Ok(ProgressStatus::Complete),
            other => Err(crate::Error::Parse(format!("Unknown progress status: {}", other))),
        }
    }
}

/// The single latest-wins progress record kept per bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    /// Fraction in `0.0..=1.0`.
    pub progress: f64,
    pub stage: String,
    pub message: String,
    /// RFC 3339 timestamp of the write.
    pub timestamp: String,
}

impl ProgressRecord {
    /// Build a record from a percent in `0..=100` (clamped).
    pub fn new(stage: impl Into<String>, percent: f64, message: impl Into<String>) -> Self {
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, COMPLETE_PERCENT) };
        Self {
            status: ProgressStatus::for_percent(percent),
            progress: percent / COMPLETE_PERCENT,
            stage: stage.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Progress as a percent in `0..=100`.
    pub fn percent(&self) -> f64 {
        self.progress * COMPLETE_PERCENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tracks_percent() {
        for pct in [0.0, 5.0, 40.0, 99.9] {
            let r = ProgressRecord::new("Stage", pct, "m");
            assert_eq!(r.status, ProgressStatus::Processing);
        }
        let done = ProgressRecord::new("Complete", 100.0, "done");
        assert_eq!(done.status, ProgressStatus::Complete);
        assert_eq!(done.progress, 1.0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let over = ProgressRecord::new("Complete", 140.0, "m");
        assert_eq!(over.progress, 1.0);
        assert_eq!(over.status, ProgressStatus::Complete);

        let under = ProgressRecord::new("Initializing", -3.0, "m");
        assert_eq!(under.progress, 0.0);
    }

    #[test]
    fn test_record_serializes_lowercase_status() {
        let r = ProgressRecord::new("OCR", 40.0, "Reading document");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "processing");
        assert_eq!(v["progress"], 0.4);
        assert_eq!(v["stage"], "OCR");
        assert!(v["timestamp"].is_string());
    }
}
