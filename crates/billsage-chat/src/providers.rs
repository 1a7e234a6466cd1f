//! External LLM provider calls.
//!
//! OpenAI and Groq share the chat-completions format; Anthropic uses the
//! Messages API with a separate system field. All calls are
//! non-streaming and return the assistant's text content.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::{LLMConfig, ResolvedProvider};
use crate::types::{ChatError, ChatMessage, CompletionRequest, LLMProvider};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anything that can answer a chat completion request with text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ChatError>;

    /// Temperature the classifier should request.
    fn classification_temperature(&self) -> f64 {
        crate::config::DEFAULT_CLASSIFICATION_TEMPERATURE
    }
}

/// Completion client backed by the shared, editable [`LLMConfig`].
///
/// The provider is resolved per call so config edits take effect without
/// a restart.
pub struct HttpCompletionClient {
    client: Client,
    config: Arc<RwLock<LLMConfig>>,
}

impl HttpCompletionClient {
    pub fn new(client: Client, config: Arc<RwLock<LLMConfig>>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ChatError> {
        let resolved = self
            .config
            .read()
            .resolve_provider()
            .ok_or(ChatError::NotConfigured)?;
        complete_with(&self.client, &resolved, &request).await
    }

    fn classification_temperature(&self) -> f64 {
        self.config.read().classification_temperature
    }
}

/// Send one completion request to a resolved provider.
pub async fn complete_with(
    client: &Client,
    resolved: &ResolvedProvider,
    request: &CompletionRequest,
) -> Result<String, ChatError> {
    match resolved.provider {
        LLMProvider::OpenAI => complete_openai_compat(client, OPENAI_URL, resolved, request).await,
        LLMProvider::Groq => complete_openai_compat(client, GROQ_URL, resolved, request).await,
        LLMProvider::Anthropic => complete_anthropic(client, resolved, request).await,
    }
}

/// Request body for OpenAI-compatible APIs (OpenAI, Groq).
fn openai_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let msgs: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": msgs,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

/// Request body for Anthropic's Messages API.
///
/// Anthropic has no JSON response mode; the instruction is appended to the
/// system prompt instead.
fn anthropic_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut system_msg: Option<String> = request
        .messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.clone());

    if request.json_mode {
        let suffix = "Respond with a single JSON object and nothing else.";
        system_msg = Some(match system_msg {
            Some(s) => format!("{}\n\n{}", s, suffix),
            None => suffix.to_string(),
        });
    }

    let conv_msgs: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m: &ChatMessage| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv_msgs,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if let Some(sys) = system_msg {
        body["system"] = json!(sys);
    }
    body
}

async fn complete_openai_compat(
    client: &Client,
    url: &str,
    resolved: &ResolvedProvider,
    request: &CompletionRequest,
) -> Result<String, ChatError> {
    let body = openai_body(&resolved.model, request);
    debug!("Completion request to {} with model {}", url, resolved.model);

    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {}", resolved.api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| ChatError::Request(e.to_string()))?;

    let parsed = read_json(response).await?;
    parsed["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ChatError::Response("missing choices[0].message.content".into()))
}

async fn complete_anthropic(
    client: &Client,
    resolved: &ResolvedProvider,
    request: &CompletionRequest,
) -> Result<String, ChatError> {
    let body = anthropic_body(&resolved.model, request);
    debug!("Completion request to Anthropic with model {}", resolved.model);

    let response = client
        .post(ANTHROPIC_URL)
        .header("x-api-key", &resolved.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| ChatError::Request(e.to_string()))?;

    let parsed = read_json(response).await?;
    let text: String = parsed["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ChatError::Response("no text content blocks".into()));
    }
    Ok(text)
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, ChatError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::Api {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ChatError::Response(e.to_string()))
}

/// Test an API key by making a minimal request.
pub async fn test_api_key(provider: &str, api_key: &str) -> Result<(), String> {
    let client = Client::new();

    let resp = match LLMProvider::from_name(provider) {
        Some(LLMProvider::OpenAI) => client
            .get("https://api.openai.com/v1/models")
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| e.to_string())?,
        Some(LLMProvider::Groq) => client
            .get("https://api.groq.com/openai/v1/models")
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| e.to_string())?,
        Some(LLMProvider::Anthropic) => {
            let resp = client
                .post(ANTHROPIC_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&json!({
                    "model": "claude-3-5-haiku-20241022",
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "Hi"}],
                }))
                .send()
                .await
                .map_err(|e| e.to_string())?;
            // 400 with a valid key is a quota/model issue, not an auth one
            if resp.status().as_u16() == 400 {
                return Ok(());
            }
            resp
        }
        None => return Err(format!("Unknown provider: {}", provider)),
    };

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("API returned status {}", resp.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json_mode: bool) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system("You are a medical billing expert."),
                ChatMessage::user("Classify: CT Scan"),
            ],
            temperature: 0.1,
            max_tokens: 300,
            json_mode,
        }
    }

    #[test]
    fn test_openai_body_json_mode() {
        let body = openai_body("gpt-4o-mini", &request(true));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["temperature"], 0.1);

        let plain = openai_body("gpt-4o-mini", &request(false));
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn test_anthropic_body_moves_system() {
        let body = anthropic_body("claude", &request(true));
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("You are a medical billing expert."));
        assert!(system.contains("single JSON object"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_errors() {
        let client = HttpCompletionClient::new(
            Client::new(),
            Arc::new(RwLock::new(LLMConfig::default())),
        );
        let err = client.complete(request(true)).await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt.block_on(test_api_key("mistral", "k")).unwrap_err();
        assert!(err.contains("Unknown provider"));
    }
}
