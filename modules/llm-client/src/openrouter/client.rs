use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use skywatch_common::TextEmbedder;

use super::types::*;
use crate::traits::{ChatCall, ChatModel};
use crate::LlmError;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

/// Default per-call deadline for chat completions.
const CHAT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default per-call deadline for embedding requests.
const EMBED_TIMEOUT: Duration = Duration::from_millis(500);

pub struct OpenRouterClient {
    api_key: String,
    http: reqwest::Client,
    embedding_model: String,
    app_name: Option<String>,
    site_url: Option<String>,
    chat_timeout: Duration,
    embed_timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, embedding_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            embedding_model: embedding_model.to_string(),
            app_name: None,
            site_url: None,
            chat_timeout: CHAT_TIMEOUT,
            embed_timeout: EMBED_TIMEOUT,
        }
    }

    pub fn with_app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    pub fn with_site_url(mut self, url: &str) -> Self {
        self.site_url = Some(url.to_string());
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| LlmError::InvalidKey)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref url) = self.site_url {
            if let Ok(val) = HeaderValue::from_str(url) {
                headers.insert("HTTP-Referer", val);
            }
        }

        if let Some(ref name) = self.app_name {
            if let Ok(val) = HeaderValue::from_str(name) {
                headers.insert("X-Title", val);
            }
        }

        Ok(headers)
    }

    async fn embed_request(&self, input: serde_json::Value) -> Result<EmbeddingResponse, LlmError> {
        let url = format!("{}/embeddings", OPENROUTER_API_URL);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .timeout(self.embed_timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenRouterClient {
    async fn complete(&self, call: &ChatCall) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", OPENROUTER_API_URL);

        debug!(model = %call.model, "OpenRouter chat request");

        let request = ChatRequest {
            model: call.model.clone(),
            messages: vec![ChatMessage::user(&call.prompt)],
            temperature: call.temperature,
            max_tokens: call.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let chat_response: ChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait::async_trait]
impl TextEmbedder for OpenRouterClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .embed_request(serde_json::Value::String(text.to_string()))
            .await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("no embedding in response"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let response = self
            .embed_request(serde_json::Value::Array(
                texts.into_iter().map(serde_json::Value::String).collect(),
            ))
            .await?;
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
