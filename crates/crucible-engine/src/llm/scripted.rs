//! Scripted chat transport for tests and offline runs
//!
//! Responses are matched by substring against the rendered prompt, so a
//! test can pin one canned output per role marker and stay independent of
//! prompt wording details.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ChatCost, ChatMessage, ChatResponse, ChatTransport, TokenUsage};
use crate::error::EngineError;

#[derive(Debug, Clone)]
struct Stub {
    marker: String,
    content: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: f64,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

/// Deterministic in-memory transport. First matching stub wins; stubs are
/// reusable across cycles. Unmatched prompts get the default response.
pub struct ScriptedTransport {
    stubs: Mutex<Vec<Stub>>,
    default_content: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            stubs: Mutex::new(Vec::new()),
            default_content: r#"{"valid": true, "summary": "noted"}"#.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `content` whenever the prompt contains `marker`.
    pub fn stub(self, marker: &str, content: &str) -> Self {
        self.stub_with_cost(marker, content, 10, 5, 0.0)
    }

    /// Like [`stub`](Self::stub) with explicit usage and cost.
    pub fn stub_with_cost(
        self,
        marker: &str,
        content: &str,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Self {
        self.stubs.lock().expect("stub lock").push(Stub {
            marker: marker.to_string(),
            content: Some(content.to_string()),
            input_tokens,
            output_tokens,
            cost_usd,
        });
        self
    }

    /// Fail with a transport error whenever the prompt contains `marker`.
    pub fn fail_when(self, marker: &str) -> Self {
        self.stubs.lock().expect("stub lock").push(Stub {
            marker: marker.to_string(),
            content: None,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        });
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call lock").clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, EngineError> {
        let prompt: String = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.lock().expect("call lock").push(RecordedCall {
            model: model.to_string(),
            prompt: prompt.clone(),
        });

        let matched = self
            .stubs
            .lock()
            .expect("stub lock")
            .iter()
            .find(|stub| prompt.contains(&stub.marker))
            .cloned();

        match matched {
            Some(Stub { content: None, marker, .. }) => Err(EngineError::Transport(format!(
                "scripted failure for '{}'",
                marker
            ))),
            Some(Stub {
                content: Some(content),
                input_tokens,
                output_tokens,
                cost_usd,
                ..
            }) => Ok(ChatResponse {
                content,
                usage: TokenUsage {
                    input_tokens,
                    output_tokens,
                },
                cost: ChatCost {
                    total_cost: cost_usd,
                },
            }),
            None => Ok(ChatResponse {
                content: self.default_content.clone(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
                cost: ChatCost { total_cost: 0.0 },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_stub_wins_and_calls_are_logged() {
        let transport = ScriptedTransport::new()
            .stub("explorer", r#"{"valid": true, "new_claim": "Y"}"#)
            .stub("critic", r#"{"valid": false}"#);
        let response = transport
            .chat("m1", &[ChatMessage::system("you are the explorer agent")])
            .await
            .unwrap();
        assert!(response.content.contains("new_claim"));
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(transport.calls()[0].model, "m1");
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_transport_error() {
        let transport = ScriptedTransport::new().fail_when("historian");
        let result = transport
            .chat("m1", &[ChatMessage::user("historian context")])
            .await;
        assert!(matches!(result, Err(EngineError::Transport(_))));
    }

    #[tokio::test]
    async fn unmatched_prompt_gets_default_response() {
        let transport = ScriptedTransport::new();
        let response = transport
            .chat("m1", &[ChatMessage::user("anything")])
            .await
            .unwrap();
        assert!(response.content.contains("valid"));
    }
}
