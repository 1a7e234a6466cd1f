//! Chat completion types and the LLM config API surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl LLMProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(LLMProvider::OpenAI),
            "anthropic" => Some(LLMProvider::Anthropic),
            "groq" => Some(LLMProvider::Groq),
            _ => None,
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

/// Chat message sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// One non-streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

/// Errors raised by the completion client.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No LLM provider configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    Response(String),
}

impl From<ChatError> for billsage_core::Error {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NotConfigured => billsage_core::Error::Config(e.to_string()),
            ChatError::Response(msg) => billsage_core::Error::Parse(msg),
            other => billsage_core::Error::ExternalCall(other.to_string()),
        }
    }
}

/// Public view of one provider: never carries the key itself.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: LLMProvider,
    pub configured: bool,
    pub model: String,
}

/// LLM config response (keys masked).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigResponse {
    pub preferred_provider: String,
    pub active_provider: Option<LLMProvider>,
    pub classification_temperature: f64,
    pub providers: Vec<ProviderStatus>,
}

/// Key and/or model change for one provider. Absent fields are left as is.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub provider: LLMProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// LLM config update request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigUpdate {
    #[serde(default)]
    pub preferred_provider: Option<String>,
    #[serde(default)]
    pub classification_temperature: Option<f64>,
    #[serde(default)]
    pub providers: Vec<ProviderUpdate>,
}

impl LLMConfigUpdate {
    /// Update that only sets one provider's key.
    pub fn api_key(provider: LLMProvider, key: impl Into<String>) -> Self {
        Self {
            providers: vec![ProviderUpdate {
                provider,
                api_key: Some(key.into()),
                model: None,
            }],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKeyRequest {
    pub provider: String,
    pub api_key: String,
}
