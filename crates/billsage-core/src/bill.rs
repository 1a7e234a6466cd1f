//! Bill data model shared by every stage of the pipeline.
//!
//! The extraction service answers with loosely-typed JSON (numbers as
//! strings, `null` for missing fields), so the structured types here
//! deserialize leniently and fill gaps with [`NOT_FOUND`].

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder for fields the extractor could not locate.
pub const NOT_FOUND: &str = "Not found";

/// Upper bound on sibling descriptions carried in a [`BillContext`].
pub const MAX_CONTEXT_SIBLINGS: usize = 10;

/// Below this confidence a decision is flagged for human review.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

fn not_found() -> String {
    NOT_FOUND.to_string()
}

// ---------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------

/// Lifecycle status of an uploaded bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Processing,
    Analyzed,
    Failed,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Processing => "processing",
            BillStatus::Analyzed => "analyzed",
            BillStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillStatus::Pending),
            "processing" => Ok(BillStatus::Processing),
            "analyzed" => Ok(BillStatus::Analyzed),
            "failed" => Ok(BillStatus::Failed),
            other => Err(crate::Error::Parse(format!("Unknown bill status: {}", other))),
        }
    }
}

/// An uploaded bill and everything the pipeline attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub user_id: String,
    pub document_url: String,
    pub status: BillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<StructuredBill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<i64>,
}

// ---------------------------------------------------------------
// Extracted structure
// ---------------------------------------------------------------

/// Which call the extraction endpoint should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Extract,
    Qa,
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMode::Extract => write!(f, "extract"),
            ExtractionMode::Qa => write!(f, "qa"),
        }
    }
}

/// Where the structured bill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Remote,
    Offline,
}

/// Provenance stamped onto every extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub timestamp: String,
    pub model: String,
    pub text_length: usize,
    pub mode: ExtractionMode,
    pub used_previous_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub full_name: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub date_of_birth: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub account_number: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub insurance_info: String,
}

impl Default for PatientInfo {
    fn default() -> Self {
        Self {
            full_name: not_found(),
            date_of_birth: not_found(),
            account_number: not_found(),
            insurance_info: not_found(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillInfo {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<f64>,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub service_dates: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub due_date: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub facility_name: String,
    #[serde(default = "not_found", deserialize_with = "lenient_text")]
    pub provider_name: String,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub facility_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub bill_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub place_of_service: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub patient_type: Option<String>,
}

impl Default for BillInfo {
    fn default() -> Self {
        Self {
            total_amount: None,
            service_dates: not_found(),
            due_date: not_found(),
            facility_name: not_found(),
            provider_name: not_found(),
            facility_type: None,
            bill_type: None,
            place_of_service: None,
            patient_type: None,
        }
    }
}

/// One billed line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default, deserialize_with = "lenient_text_or_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default, alias = "diagnosisCode", deserialize_with = "lenient_opt_text")]
    pub diagnostic_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub service_date: Option<String>,
}

impl Service {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code: None,
            amount: None,
            diagnostic_code: None,
            category: None,
            service_date: None,
        }
    }
}

/// Structured bill as returned by the extraction service.
///
/// Unknown top-level keys are preserved in `extra` so a re-extraction can
/// hand the full previous payload back to the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredBill {
    #[serde(default, deserialize_with = "null_as_default")]
    pub patient_info: PatientInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bill_info: BillInfo,
    #[serde(default, deserialize_with = "lenient_services")]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_metadata: Option<AnalysisMetadata>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------
// Classification
// ---------------------------------------------------------------

/// Pricing component of a billed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Professional,
    Facility,
    /// Both components billed together.
    Global,
}

impl ComponentType {
    /// Pricing database the component is looked up in.
    ///
    /// Global services go to PFS unsplit.
    pub fn database(&self) -> PricingDatabase {
        match self {
            ComponentType::Facility => PricingDatabase::Opps,
            ComponentType::Professional | ComponentType::Global => PricingDatabase::Pfs,
        }
    }

    /// Lenient parse of a model-reported component label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "professional" => Some(ComponentType::Professional),
            "facility" => Some(ComponentType::Facility),
            "global" => Some(ComponentType::Global),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Professional => write!(f, "professional"),
            ComponentType::Facility => write!(f, "facility"),
            ComponentType::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingDatabase {
    /// Medicare Physician Fee Schedule.
    #[serde(rename = "PFS")]
    Pfs,
    /// Outpatient Prospective Payment System.
    #[serde(rename = "OPPS")]
    Opps,
}

impl std::fmt::Display for PricingDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingDatabase::Pfs => write!(f, "PFS"),
            PricingDatabase::Opps => write!(f, "OPPS"),
        }
    }
}

/// Which classifier stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionTier {
    Rule,
    Context,
    Ai,
    ErrorDefault,
}

impl std::fmt::Display for DecisionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionTier::Rule => write!(f, "rule"),
            DecisionTier::Context => write!(f, "context"),
            DecisionTier::Ai => write!(f, "ai"),
            DecisionTier::ErrorDefault => write!(f, "error-default"),
        }
    }
}

/// Verdict attached to one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDecision {
    pub component_type: ComponentType,
    pub database: PricingDatabase,
    pub confidence: f64,
    pub reasoning: String,
    pub tier: DecisionTier,
}

impl ClassificationDecision {
    /// Build a decision; the database always follows the component type.
    pub fn new(
        component_type: ComponentType,
        confidence: f64,
        reasoning: impl Into<String>,
        tier: DecisionTier,
    ) -> Self {
        Self {
            component_type,
            database: component_type.database(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            tier,
        }
    }

    /// Fixed low-confidence verdict used whenever classification fails.
    pub fn error_default(reason: impl Into<String>) -> Self {
        Self::new(
            ComponentType::Professional,
            0.5,
            reason,
            DecisionTier::ErrorDefault,
        )
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence < LOW_CONFIDENCE_THRESHOLD
    }
}

/// Bill-level metadata handed to the classifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillContext {
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub facility_type: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub bill_type: Option<String>,
    #[serde(default)]
    pub place_of_service: Option<String>,
    #[serde(default)]
    pub patient_type: Option<String>,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default)]
    pub sibling_descriptions: Vec<String>,
}

impl BillContext {
    /// Derive the classification context from an extracted bill.
    pub fn from_bill(bill: &StructuredBill) -> Self {
        let info = &bill.bill_info;
        Self {
            facility_name: found(&info.facility_name),
            facility_type: info.facility_type.clone(),
            provider_name: found(&info.provider_name),
            bill_type: info.bill_type.clone(),
            place_of_service: info.place_of_service.clone(),
            patient_type: info.patient_type.clone(),
            service_date: found(&info.service_dates),
            sibling_descriptions: bill
                .services
                .iter()
                .map(|s| s.description.trim())
                .filter(|d| !d.is_empty())
                .take(MAX_CONTEXT_SIBLINGS)
                .map(|d| d.to_string())
                .collect(),
        }
    }

    /// Lower-cased, trimmed facility type, or `None` when unusable.
    pub fn normalized_facility_type(&self) -> Option<String> {
        self.facility_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }
}

fn found(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A service with the decision attached to it in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedService {
    pub service: Service,
    pub decision: ClassificationDecision,
}

/// Per-component counts over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub professional: usize,
    pub facility: usize,
    pub global: usize,
    pub low_confidence: usize,
}

impl AnalysisSummary {
    pub fn from_services(services: &[ClassifiedService]) -> Self {
        let mut summary = Self::default();
        for item in services {
            match item.decision.component_type {
                ComponentType::Professional => summary.professional += 1,
                ComponentType::Facility => summary.facility += 1,
                ComponentType::Global => summary.global += 1,
            }
            if item.decision.is_low_confidence() {
                summary.low_confidence += 1;
            }
        }
        summary
    }
}

/// Final output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub run_id: String,
    pub extraction_source: ExtractionSource,
    pub services: Vec<ClassifiedService>,
    pub summary: AnalysisSummary,
    pub completed_at: i64,
}

// ---------------------------------------------------------------
// Lenient deserializers
// ---------------------------------------------------------------

fn value_to_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value_to_text(value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(not_found))
}

fn lenient_text_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value_to_text(value).map(|s| s.trim().to_string()).unwrap_or_default())
}

fn lenient_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value_to_text(value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(NOT_FOUND)))
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + serde::de::DeserializeOwned,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => Ok(T::default()),
        value => serde_json::from_value(value).map_err(serde::de::Error::custom),
    }
}

/// Objects parse as services and bare strings become descriptions.
/// Anything else in the list is dropped.
fn lenient_services<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Service>, D::Error> {
    let items = match serde_json::Value::deserialize(d)? {
        serde_json::Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(_) => serde_json::from_value(item).ok(),
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some(Service::new(s.trim()))
            }
            _ => None,
        })
        .collect())
}

fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount(&s),
        _ => None,
    })
}

/// Parse a currency string such as `"$1,234.50"` or `"(45.00)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let negative =
        (trimmed.starts_with('(') && trimmed.ends_with(')')) || trimmed.starts_with('-');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}
