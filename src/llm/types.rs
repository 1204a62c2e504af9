//! Per-call model configuration and the token stream type

use super::LlmError;
use futures::Stream;
use std::fmt;
use std::pin::Pin;

/// Lazily produced model output, one item per streamed token
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Everything one model invocation needs. Built per turn, never shared
/// mutably between turns.
#[derive(Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub base_url: String,
    pub api_key: String,
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    /// Chat completions endpoint under `base_url`
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
