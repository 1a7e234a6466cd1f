//! Component classification: decides whether each billed service is priced
//! as a professional fee (PFS) or a facility fee (OPPS).
//!
//! Three tiers run in a fixed order and the first verdict wins: explicit
//! textual cues, then facility metadata, then a language model.

pub mod ai;
pub mod context;
pub mod engine;
pub mod rules;

pub use ai::AiClassifier;
pub use context::ContextClassifier;
pub use engine::{ClassifierTier, DecisionEngine};
pub use rules::RuleClassifier;
