pub mod openrouter;
pub mod traits;

pub use openrouter::OpenRouterClient;
pub use traits::{ChatCall, ChatModel};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited (429)")]
    RateLimited,

    #[error("server error ({status})")]
    Server { status: u16 },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid API key")]
    InvalidKey,

    #[error("empty response")]
    EmptyResponse,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl LlmError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => LlmError::RateLimited,
            s if s >= 500 => LlmError::Server { status: s },
            s => LlmError::Api { status: s, body },
        }
    }

    /// Whether the next model in a round-robin list should be tried.
    /// 429s, 5xx and transport timeouts rotate; 4xx means the request itself
    /// is bad and retrying elsewhere is pointless.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited | LlmError::Server { .. } | LlmError::EmptyResponse => true,
            LlmError::Transport(e) => e.is_timeout() || e.is_connect(),
            LlmError::Api { .. } | LlmError::InvalidKey => false,
        }
    }
}
