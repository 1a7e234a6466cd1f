//! Keyword/pattern tier: explicit component cues in the description.

use async_trait::async_trait;
use billsage_core::{BillContext, ClassificationDecision, ComponentType, DecisionTier, Service};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::ClassifierTier;

/// One entry of a rule table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub pattern: &'static str,
    pub component: ComponentType,
    pub confidence: f64,
    pub label: &'static str,
}

const fn rule(
    pattern: &'static str,
    component: ComponentType,
    confidence: f64,
    label: &'static str,
) -> Rule {
    Rule {
        pattern,
        component,
        confidence,
        label,
    }
}

/// Professional cues. Evaluated before every facility cue, so a
/// description carrying both resolves to professional.
pub const PROFESSIONAL_RULES: &[Rule] = &[
    rule(r"professional\s+fee", ComponentType::Professional, 0.9, "professional fee"),
    rule(r"physician\s+fee", ComponentType::Professional, 0.9, "physician fee"),
    rule(r"interpretation\s+only", ComponentType::Professional, 0.9, "interpretation only"),
    rule(r"professional\s+component", ComponentType::Professional, 0.9, "professional component"),
    rule(r"-26\b", ComponentType::Professional, 0.9, "modifier 26"),
    rule(r"\bprof\b", ComponentType::Professional, 0.9, "prof"),
];

pub const FACILITY_RULES: &[Rule] = &[
    rule(r"facility\s+fee", ComponentType::Facility, 0.9, "facility fee"),
    rule(r"technical\s+component", ComponentType::Facility, 0.9, "technical component"),
    rule(r"operating\s+room", ComponentType::Facility, 0.9, "operating room"),
    rule(r"-tc\b", ComponentType::Facility, 0.9, "modifier TC"),
    rule(r"\btech\b", ComponentType::Facility, 0.9, "tech"),
];

pub const GLOBAL_RULES: &[Rule] = &[
    rule(r"\bglobal\b", ComponentType::Global, 0.85, "global"),
    rule(r"complete\s+procedure", ComponentType::Global, 0.85, "complete procedure"),
];

static COMPILED: Lazy<Vec<(Regex, Rule)>> = Lazy::new(|| {
    PROFESSIONAL_RULES
        .iter()
        .chain(FACILITY_RULES)
        .chain(GLOBAL_RULES)
        .map(|r| (Regex::new(r.pattern).unwrap(), *r))
        .collect()
});

/// Deterministic, zero-latency classifier over the rule tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleClassifier;

impl RuleClassifier {
    /// First matching rule for a description, in table order.
    pub fn matching_rule(description: &str) -> Option<Rule> {
        let lowered = description.to_lowercase();
        COMPILED
            .iter()
            .find(|(re, _)| re.is_match(&lowered))
            .map(|(_, r)| *r)
    }

    pub fn classify_description(description: &str) -> Option<ClassificationDecision> {
        Self::matching_rule(description).map(|r| {
            ClassificationDecision::new(
                r.component,
                r.confidence,
                format!("Description contains explicit {} cue \"{}\"", r.component, r.label),
                DecisionTier::Rule,
            )
        })
    }
}

#[async_trait]
impl ClassifierTier for RuleClassifier {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn classify(
        &self,
        service: &Service,
        _context: &BillContext,
    ) -> Option<ClassificationDecision> {
        Self::classify_description(&service.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billsage_core::PricingDatabase;

    #[test]
    fn test_every_rule_compiles_and_matches_its_label() {
        for r in PROFESSIONAL_RULES.iter().chain(FACILITY_RULES).chain(GLOBAL_RULES) {
            let re = Regex::new(r.pattern).unwrap();
            let sample = match r.label {
                "modifier 26" => "71046-26".to_string(),
                "modifier TC" => "71046-tc".to_string(),
                other => other.to_string(),
            };
            assert!(re.is_match(&sample), "{} should match {}", r.pattern, sample);
        }
    }

    #[test]
    fn test_professional_cue() {
        let d = RuleClassifier::classify_description("Professional Fee - Radiology Interpretation")
            .unwrap();
        assert_eq!(d.component_type, ComponentType::Professional);
        assert_eq!(d.database, PricingDatabase::Pfs);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.tier, DecisionTier::Rule);

        let d = RuleClassifier::classify_description("CHEST XRAY INTERPRETATION ONLY").unwrap();
        assert_eq!(d.component_type, ComponentType::Professional);
    }

    #[test]
    fn test_facility_cue() {
        let d = RuleClassifier::classify_description("Facility Fee - ER Visit").unwrap();
        assert_eq!(d.component_type, ComponentType::Facility);
        assert_eq!(d.database, PricingDatabase::Opps);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_professional_wins_tie() {
        let d = RuleClassifier::classify_description("Facility fee and professional fee").unwrap();
        assert_eq!(d.component_type, ComponentType::Professional);

        let d = RuleClassifier::classify_description("Operating Room / Physician Fee").unwrap();
        assert_eq!(d.component_type, ComponentType::Professional);
    }

    #[test]
    fn test_global_cue() {
        let d = RuleClassifier::classify_description("MRI Brain - Global").unwrap();
        assert_eq!(d.component_type, ComponentType::Global);
        assert_eq!(d.database, PricingDatabase::Pfs);
        assert_eq!(d.confidence, 0.85);
    }

    #[test]
    fn test_no_cue() {
        assert!(RuleClassifier::classify_description("CT Scan").is_none());
        assert!(RuleClassifier::classify_description("Technology assessment").is_none());
        assert!(RuleClassifier::classify_description("Profile panel").is_none());
        assert!(RuleClassifier::classify_description("").is_none());
    }
}
