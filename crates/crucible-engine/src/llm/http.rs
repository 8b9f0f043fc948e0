//! OpenAI-compatible HTTP chat transport
//!
//! Talks to any `/v1/chat/completions`-shaped endpoint. The API key is
//! required at construction; the requested model must belong to the
//! configured pool, enforced at the interface boundary.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{ChatCost, ChatMessage, ChatResponse, ChatTransport, TokenUsage};
use crate::error::EngineError;

/// Env var holding the provider API key.
pub const API_KEY_ENV: &str = "CRUCIBLE_API_KEY";

/// Default endpoint; override with `CRUCIBLE_API_BASE`.
const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Hard request timeout. Per-agent deadlines are usually tighter; this
/// bounds the transport when they are not.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    cost: f64,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

/// Chat transport backed by an OpenAI-compatible completions endpoint.
pub struct HttpChatTransport {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model_pool: Vec<String>,
}

impl HttpChatTransport {
    /// Build a transport for the given model pool. Fails when the API key
    /// env var is absent or empty.
    pub fn from_env(model_pool: Vec<String>) -> Result<Self, EngineError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                EngineError::Transport(format!("{} is not set; cannot reach provider", API_KEY_ENV))
            })?;
        let api_base =
            std::env::var("CRUCIBLE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base,
            api_key,
            model_pool,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, EngineError> {
        if !self.model_pool.iter().any(|m| m == model) {
            return Err(EngineError::Transport(format!(
                "model '{}' is not in the configured pool",
                model
            )));
        }

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Transport(format!(
                "provider returned {}: {}",
                status,
                detail.chars().take(300).collect::<String>()
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("malformed provider body: {}", e)))?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| EngineError::Transport("provider returned no choices".into()))?;

        let usage = wire.usage.unwrap_or_default();
        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
            cost: ChatCost {
                total_cost: usage.cost,
            },
        })
    }
}
