//! LLM configuration persistence and provider selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{LLMConfigResponse, LLMConfigUpdate, LLMProvider, ProviderStatus};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Low sampling temperature keeps component verdicts stable across runs.
pub const DEFAULT_CLASSIFICATION_TEMPERATURE: f64 = 0.1;

/// Key and model for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
}

impl ProviderSettings {
    fn with_model(model: &str) -> Self {
        Self {
            api_key: None,
            model: model.into(),
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// The provider a request will actually go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider: LLMProvider,
    pub model: String,
    pub api_key: String,
}

/// Stored LLM configuration (persisted to llm-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default = "default_openai")]
    pub openai: ProviderSettings,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderSettings,
    #[serde(default = "default_groq")]
    pub groq: ProviderSettings,
    #[serde(default = "default_temperature")]
    pub classification_temperature: f64,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_openai() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_OPENAI_MODEL)
}
fn default_anthropic() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_ANTHROPIC_MODEL)
}
fn default_groq() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_GROQ_MODEL)
}
fn default_temperature() -> f64 {
    DEFAULT_CLASSIFICATION_TEMPERATURE
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred(),
            openai: default_openai(),
            anthropic: default_anthropic(),
            groq: default_groq(),
            classification_temperature: DEFAULT_CLASSIFICATION_TEMPERATURE,
            config_path: PathBuf::new(),
        }
    }
}

impl LLMConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: LLMConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        for (settings, var) in [
            (&mut config.openai, "OPENAI_API_KEY"),
            (&mut config.anthropic, "ANTHROPIC_API_KEY"),
            (&mut config.groq, "GROQ_API_KEY"),
        ] {
            if settings.api_key.is_none() {
                settings.api_key = std::env::var(var).ok();
            }
        }

        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved LLM config to {}", self.config_path.display());
        Ok(())
    }

    /// Merge an update into the stored config.
    pub fn apply_update(&mut self, update: &LLMConfigUpdate) {
        if let Some(p) = &update.preferred_provider {
            self.preferred_provider = p.clone();
        }
        for change in &update.providers {
            let settings = self.settings_mut(change.provider);
            if let Some(k) = &change.api_key {
                settings.api_key = Some(k.clone());
            }
            if let Some(m) = &change.model {
                settings.model = m.clone();
            }
        }
        if let Some(t) = update.classification_temperature {
            self.classification_temperature = t.clamp(0.0, 2.0);
        }
    }

    pub fn settings(&self, provider: LLMProvider) -> &ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &self.openai,
            LLMProvider::Anthropic => &self.anthropic,
            LLMProvider::Groq => &self.groq,
        }
    }

    fn settings_mut(&mut self, provider: LLMProvider) -> &mut ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &mut self.openai,
            LLMProvider::Anthropic => &mut self.anthropic,
            LLMProvider::Groq => &mut self.groq,
        }
    }

    /// Resolve which provider and model to use.
    ///
    /// An explicit preference is honored only when that provider has a key;
    /// `auto` picks Anthropic, then Groq, then OpenAI.
    pub fn resolve_provider(&self) -> Option<ResolvedProvider> {
        let candidates: Vec<LLMProvider> = if self.preferred_provider == "auto" {
            vec![LLMProvider::Anthropic, LLMProvider::Groq, LLMProvider::OpenAI]
        } else {
            LLMProvider::from_name(&self.preferred_provider)
                .into_iter()
                .collect()
        };

        candidates.into_iter().find_map(|provider| {
            let settings = self.settings(provider);
            if !settings.is_configured() {
                return None;
            }
            settings.api_key.as_ref().map(|key| ResolvedProvider {
                provider,
                model: settings.model.clone(),
                api_key: key.clone(),
            })
        })
    }

    /// Public view of the config, with keys reduced to a `configured` flag.
    pub fn to_response(&self) -> LLMConfigResponse {
        let providers = [LLMProvider::OpenAI, LLMProvider::Anthropic, LLMProvider::Groq]
            .into_iter()
            .map(|provider| {
                let settings = self.settings(provider);
                ProviderStatus {
                    provider,
                    configured: settings.is_configured(),
                    model: settings.model.clone(),
                }
            })
            .collect();

        LLMConfigResponse {
            preferred_provider: self.preferred_provider.clone(),
            active_provider: self.resolve_provider().map(|r| r.provider),
            classification_temperature: self.classification_temperature,
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(provider: LLMProvider) -> LLMConfig {
        let mut config = LLMConfig::default();
        let key = match provider {
            LLMProvider::OpenAI => "sk-openai",
            LLMProvider::Anthropic => "sk-ant",
            LLMProvider::Groq => "gsk",
        };
        config.apply_update(&LLMConfigUpdate::api_key(provider, key));
        config
    }

    #[test]
    fn test_unconfigured_resolves_to_none() {
        assert!(LLMConfig::default().resolve_provider().is_none());
    }

    #[test]
    fn test_auto_prefers_anthropic() {
        let mut config = keyed(LLMProvider::OpenAI);
        config.apply_update(&LLMConfigUpdate::api_key(LLMProvider::Anthropic, "sk-ant"));
        let resolved = config.resolve_provider().unwrap();
        assert_eq!(resolved.provider, LLMProvider::Anthropic);
        assert_eq!(resolved.model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_explicit_preference_without_key() {
        let mut config = keyed(LLMProvider::OpenAI);
        config.preferred_provider = "groq".into();
        assert!(config.resolve_provider().is_none());

        config.preferred_provider = "openai".into();
        assert_eq!(config.resolve_provider().unwrap().api_key, "sk-openai");
    }

    #[test]
    fn test_response_masks_keys() {
        let config = keyed(LLMProvider::Groq);
        let json = serde_json::to_value(config.to_response()).unwrap();
        assert_eq!(json["activeProvider"], "groq");
        let groq = json["providers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["provider"] == "groq")
            .unwrap();
        assert_eq!(groq["configured"], true);
        assert_eq!(groq["model"], DEFAULT_GROQ_MODEL);
        assert!(!json.to_string().contains("gsk"));
    }

    #[test]
    fn test_update_from_json() {
        let update: LLMConfigUpdate = serde_json::from_value(serde_json::json!({
            "preferredProvider": "openai",
            "classificationTemperature": 5.0,
            "providers": [{ "provider": "openai", "apiKey": "sk-1", "model": "gpt-4o" }],
        }))
        .unwrap();
        let mut config = LLMConfig::default();
        config.apply_update(&update);

        let resolved = config.resolve_provider().unwrap();
        assert_eq!(resolved.provider, LLMProvider::OpenAI);
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(config.classification_temperature, 2.0);
        assert_eq!(config.anthropic.model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm-config.json");
        let mut config = keyed(LLMProvider::Anthropic);
        config.config_path = path.clone();
        config.classification_temperature = 0.2;
        config.save().unwrap();

        let loaded = LLMConfig::load(&path);
        assert_eq!(loaded.anthropic.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(loaded.classification_temperature, 0.2);
    }
}
