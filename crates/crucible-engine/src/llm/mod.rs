//! LLM chat transport
//!
//! The engine consumes a minimal capability set: `chat` against a named
//! model plus `chat_random` over the configured pool. Implementations:
//! an OpenAI-compatible HTTP client for real providers and a scripted
//! in-memory transport for tests.

mod http;
mod scripted;

pub use http::HttpChatTransport;
pub use scripted::ScriptedTransport;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Token usage as reported by the provider. Missing values are zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

/// Provider-reported cost. Missing values are zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChatCost {
    #[serde(default)]
    pub total_cost: f64,
}

/// A completed chat call.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub cost: ChatCost,
}

/// Outbound chat capability.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// One chat completion against a named model.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, EngineError>;
}

/// Draw a model uniformly from the pool. The draw is per-call: two agents
/// in the same cycle may land on the same model.
pub fn sample_model<R: Rng>(pool: &[String], rng: &mut R) -> Option<String> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.gen_range(0..pool.len())].clone())
}
