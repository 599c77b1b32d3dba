use async_trait::async_trait;

use crate::LlmError;

/// A chat-completion backend. Implemented by the OpenRouter client in
/// production and by static doubles in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a single-turn prompt to a named model and return the raw
    /// completion text.
    async fn complete(&self, req: &ChatCall) -> Result<String, LlmError>;
}

/// One chat call. Deterministic decoding is the default: callers that want
/// sampling must opt in explicitly.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatCall {
    pub fn deterministic(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}
