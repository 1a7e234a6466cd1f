//! LLM access for the classifier's last-resort tier.
//!
//! Provides provider configuration (persisted to JSON, keys masked on the
//! way out) and a non-streaming chat completion client that asks for a
//! JSON object response. Calls go to external APIs.

pub mod config;
pub mod providers;
pub mod types;

pub use config::LLMConfig;
pub use providers::{CompletionClient, HttpCompletionClient};
pub use types::*;
