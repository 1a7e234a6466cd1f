//! Facility-metadata tier.

use async_trait::async_trait;
use billsage_core::{BillContext, ClassificationDecision, ComponentType, DecisionTier, Service};

use crate::engine::ClassifierTier;

pub const CONTEXT_CONFIDENCE: f64 = 0.8;

/// Facility types that bill facility fees. Checked first.
pub const FACILITY_KEYWORDS: &[&str] = &[
    "hospital",
    "outpatient",
    "emergency",
    "asc",
    "ambulatory surgical center",
];

pub const PROFESSIONAL_KEYWORDS: &[&str] = &["office", "clinic", "physician", "private practice"];

#[derive(Debug, Default, Clone, Copy)]
pub struct ContextClassifier;

impl ContextClassifier {
    /// Classify from an already normalized (lower-cased) facility type.
    pub fn classify_facility_type(facility_type: &str) -> Option<ClassificationDecision> {
        let tables = [
            (FACILITY_KEYWORDS, ComponentType::Facility),
            (PROFESSIONAL_KEYWORDS, ComponentType::Professional),
        ];
        tables.iter().find_map(|(keywords, component)| {
            keywords
                .iter()
                .find(|k| facility_type.contains(*k))
                .map(|k| {
                    ClassificationDecision::new(
                        *component,
                        CONTEXT_CONFIDENCE,
                        format!("Facility type \"{}\" indicates {} billing ({})", facility_type, component, k),
                        DecisionTier::Context,
                    )
                })
        })
    }
}

#[async_trait]
impl ClassifierTier for ContextClassifier {
    fn name(&self) -> &'static str {
        "context"
    }

    async fn classify(
        &self,
        _service: &Service,
        context: &BillContext,
    ) -> Option<ClassificationDecision> {
        context
            .normalized_facility_type()
            .and_then(|t| Self::classify_facility_type(&t))
    }
}
