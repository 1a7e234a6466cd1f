//! Language-model tier. Always produces a verdict: any call or parse
//! failure degrades to [`ClassificationDecision::error_default`].

use std::sync::Arc;

use async_trait::async_trait;
use billsage_chat::{ChatMessage, CompletionClient, CompletionRequest};
use billsage_core::{BillContext, ClassificationDecision, ComponentType, DecisionTier, Service};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::ClassifierTier;

pub const DEFAULT_AI_CONFIDENCE: f64 = 0.7;
pub const MAX_PROMPT_SIBLINGS: usize = 5;
const MAX_TOKENS: usize = 300;

pub const SYSTEM_PROMPT: &str = "You are a medical billing expert specializing in Medicare pricing. \
You decide whether a billed service is a professional component (priced with the Physician Fee \
Schedule), a facility component (priced with the Outpatient Prospective Payment System), or a \
global service that bundles both. Answer only with JSON.";

#[derive(Debug, Deserialize)]
struct AiVerdict {
    #[serde(rename = "componentType", alias = "component_type")]
    component_type: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct AiClassifier {
    client: Arc<dyn CompletionClient>,
}

impl AiClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Ask the model; never fails from the caller's point of view.
    pub async fn classify_service(
        &self,
        service: &Service,
        context: &BillContext,
    ) -> ClassificationDecision {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(service, context)),
            ],
            temperature: self.client.classification_temperature(),
            max_tokens: MAX_TOKENS,
            json_mode: true,
        };

        let raw = match self.client.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("AI classification call failed for '{}': {}", service.description, e);
                return ClassificationDecision::error_default(format!(
                    "AI classification unavailable: {}",
                    e
                ));
            }
        };

        match parse_verdict(&raw) {
            Some(decision) => decision,
            None => {
                warn!("Unparseable AI verdict for '{}': {}", service.description, raw);
                ClassificationDecision::error_default("AI returned an unparseable verdict")
            }
        }
    }
}

#[async_trait]
impl ClassifierTier for AiClassifier {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn classify(
        &self,
        service: &Service,
        context: &BillContext,
    ) -> Option<ClassificationDecision> {
        Some(self.classify_service(service, context).await)
    }
}

/// User prompt for one service.
pub fn build_prompt(service: &Service, context: &BillContext) -> String {
    let mut prompt = String::from("Classify this medical service.\n\n");
    prompt.push_str(&format!("Service description: {}\n", service.description));
    if let Some(code) = service.code.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Procedure code: {}\n", code));
    }
    if let Some(category) = service.category.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Category: {}\n", category));
    }

    let details = [
        ("Facility name", &context.facility_name),
        ("Facility type", &context.facility_type),
        ("Provider", &context.provider_name),
        ("Bill type", &context.bill_type),
        ("Place of service", &context.place_of_service),
        ("Patient type", &context.patient_type),
    ];
    for (label, value) in details {
        if let Some(v) = value {
            prompt.push_str(&format!("{}: {}\n", label, v));
        }
    }

    let siblings: Vec<&str> = context
        .sibling_descriptions
        .iter()
        .map(|s| s.as_str())
        .filter(|s| *s != service.description)
        .take(MAX_PROMPT_SIBLINGS)
        .collect();
    if !siblings.is_empty() {
        prompt.push_str("\nOther services on the same bill:\n");
        for s in siblings {
            prompt.push_str(&format!("- {}\n", s));
        }
    }

    prompt.push_str(
        "\nRespond with a JSON object: {\"componentType\": \"professional\" | \"facility\" | \
\"global\", \"confidence\": number between 0 and 1, \"reasoning\": string}",
    );
    prompt
}

/// Parse the model's JSON verdict. Tolerates markdown code fences.
pub fn parse_verdict(raw: &str) -> Option<ClassificationDecision> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    let verdict: AiVerdict = serde_json::from_str(body).ok()?;
    debug!("AI verdict: {:?}", verdict);

    let component = ComponentType::from_label(&verdict.component_type)
        .unwrap_or(ComponentType::Professional);
    let confidence = verdict
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_AI_CONFIDENCE);
    let reasoning = verdict
        .reasoning
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| format!("Model classified service as {}", component));

    Some(ClassificationDecision::new(
        component,
        confidence,
        reasoning,
        DecisionTier::Ai,
    ))
}
