//! Trajectory change detector
//!
//! Compares each new trajectory point against the previous one. Below the
//! similarity threshold a transition is recorded: a summarizer-tier
//! forced-choice call classifies the change, a semantic-diff call yields
//! bounded addition/removal lists, and the trigger is attributed to the
//! cycle's largest accepted delta.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, warn};

use crucible_core::{
    cosine_similarity, AgentRole, ChangeType, ClaimTransition, TrajectoryPoint, MAX_DIFF_ITEMS,
};

use crate::llm::{sample_model, ChatMessage, ChatTransport};

/// An accepted contribution as seen by the detector: who, which row, and
/// how hard it pushed.
#[derive(Debug, Clone)]
pub struct AppliedContribution {
    pub role: AgentRole,
    pub contribution_id: i64,
    pub support_delta: f64,
}

/// Classifies transitions between consecutive trajectory points.
pub struct ChangeDetector {
    transport: Arc<dyn ChatTransport>,
    model_pool: Vec<String>,
    similarity_threshold: f32,
}

impl ChangeDetector {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        model_pool: Vec<String>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            transport,
            model_pool,
            similarity_threshold,
        }
    }

    /// Detect a transition between two consecutive points. `None` when the
    /// claims are semantically close enough that nothing moved.
    pub async fn detect(
        &self,
        previous: &TrajectoryPoint,
        current: &TrajectoryPoint,
        applied: &[AppliedContribution],
    ) -> Option<ClaimTransition> {
        let similarity = cosine_similarity(&previous.embedding, &current.embedding);
        if similarity >= self.similarity_threshold {
            return None;
        }
        debug!(
            from_cycle = previous.cycle_number,
            to_cycle = current.cycle_number,
            similarity,
            "claim transition detected"
        );

        let change_type = self
            .classify(&previous.claim_text, &current.claim_text)
            .await;
        let (diff_additions, diff_removals) = self
            .semantic_diff(&previous.claim_text, &current.claim_text)
            .await;
        let (trigger_agent, trigger_contribution_id) = trigger_attribution(applied);

        Some(ClaimTransition {
            from_cycle: previous.cycle_number,
            to_cycle: current.cycle_number,
            previous_claim: previous.claim_text.clone(),
            new_claim: current.claim_text.clone(),
            trigger_agent,
            trigger_contribution_id,
            change_type,
            diff_additions,
            diff_removals,
        })
    }

    /// Four-way forced choice. Unknown or failed output falls back to
    /// refinement.
    async fn classify(&self, previous: &str, current: &str) -> ChangeType {
        let messages = vec![
            ChatMessage::system(
                "Classify how a debated claim changed. Answer with exactly one word: \
                 refinement, pivot, expansion, or contraction.",
            ),
            ChatMessage::user(format!("Before: {}\nAfter: {}", previous, current)),
        ];
        match self.chat(&messages).await {
            Some(content) => ChangeType::parse_name(&content),
            None => ChangeType::Refinement,
        }
    }

    /// Bounded semantic diff. Any failure yields empty lists.
    async fn semantic_diff(&self, previous: &str, current: &str) -> (Vec<String>, Vec<String>) {
        let messages = vec![
            ChatMessage::system(
                "List what a revised claim added and removed relative to the original. \
                 Respond with JSON {\"additions\": [...], \"removals\": [...]}; at most \
                 five items per list, two to five words per item.",
            ),
            ChatMessage::user(format!("Original: {}\nRevised: {}", previous, current)),
        ];
        let content = match self.chat(&messages).await {
            Some(content) => content,
            None => return (Vec::new(), Vec::new()),
        };
        let start = content.find('{');
        let end = content.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if end > start => &content[start..=end],
            _ => return (Vec::new(), Vec::new()),
        };
        match serde_json::from_str::<Value>(json) {
            Ok(value) => (
                bounded_list(&value, "additions"),
                bounded_list(&value, "removals"),
            ),
            Err(_) => (Vec::new(), Vec::new()),
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Option<String> {
        let model = {
            let mut rng = StdRng::from_entropy();
            sample_model(&self.model_pool, &mut rng)?
        };
        match self.transport.chat(&model, messages).await {
            Ok(response) => Some(response.content),
            Err(error) => {
                warn!(%error, "change detector call failed");
                None
            }
        }
    }
}

/// Accepted contribution with the largest |delta|; ties go to insertion
/// order. `("unknown", 0)` when the cycle applied nothing.
fn trigger_attribution(applied: &[AppliedContribution]) -> (String, i64) {
    let mut best: Option<&AppliedContribution> = None;
    for contribution in applied {
        let better = match best {
            Some(current) => contribution.support_delta.abs() > current.support_delta.abs(),
            None => true,
        };
        if better {
            best = Some(contribution);
        }
    }
    match best {
        Some(contribution) => (
            contribution.role.as_str().to_string(),
            contribution.contribution_id,
        ),
        None => ("unknown".to_string(), 0),
    }
}

/// Clamp a diff list: at most five items, five words per item, blanks
/// dropped.
fn bounded_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|item| {
                    item.split_whitespace()
                        .take(5)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .filter(|item| !item.is_empty())
                .take(MAX_DIFF_ITEMS)
                .collect()
        })
        .unwrap_or_default()
}
