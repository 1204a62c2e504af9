//! Model catalog and per-turn model resolution

use super::ModelConfig;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen3-max";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MODELS: &[&str] = &["qwen3-max", "qwen-plus"];

/// Configuration for the OpenAI-compatible backend
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Models offered to clients
    pub models: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            models: DEFAULT_MODELS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("models", &self.models)
            .finish()
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let temperature = match get("OPENAI_TEMPERATURE").map(|v| v.parse::<f32>()) {
            Some(Ok(t)) if (0.0..=2.0).contains(&t) => t,
            Some(_) => {
                tracing::warn!("Ignoring invalid OPENAI_TEMPERATURE, using default");
                defaults.temperature
            }
            None => defaults.temperature,
        };

        let models = get("TURNSTILE_MODELS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.models);

        Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            default_model: get("OPENAI_MODEL_NAME").unwrap_or(defaults.default_model),
            temperature,
            max_tokens: get("OPENAI_MAX_TOKENS").and_then(|v| v.parse().ok()),
            models,
        }
    }
}

/// Resolves which model a turn uses and builds its call configuration
pub struct ModelRegistry {
    config: LlmConfig,
}

impl ModelRegistry {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn default_model_id(&self) -> &str {
        &self.config.default_model
    }

    /// Offered models, default first
    pub fn available_models(&self) -> Vec<String> {
        let mut models = vec![self.config.default_model.clone()];
        models.extend(
            self.config
                .models
                .iter()
                .filter(|m| **m != self.config.default_model)
                .cloned(),
        );
        models
    }

    /// Request choice, then thread override, then the default
    pub fn resolve(&self, requested: Option<&str>, thread_override: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(thread_override)
            .unwrap_or(self.config.default_model.as_str())
            .to_string()
    }

    pub fn config_for(&self, model: &str) -> ModelConfig {
        ModelConfig {
            model: model.to_string(),
            temperature: Some(self.config.temperature),
            base_url: self.config.base_url.clone(),
            api_key: self.config.api_key.clone().unwrap_or_default(),
            max_tokens: self.config.max_tokens,
        }
    }
}
