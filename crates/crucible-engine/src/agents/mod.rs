//! Agent dispatcher
//!
//! Role in, result out: render the template, call a randomly sampled
//! model, parse the JSON response against the role schema, run sanity
//! checks, and resolve the proposed support delta from the role table.
//! A cost row is produced from provider-reported usage, clamped to zero
//! or above.

mod prompts;

pub use prompts::{render, PromptContext};

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::debug;

use crucible_core::{AgentOutput, AgentResult, AgentRole, LlmCostRecord};

use crate::error::EngineError;
use crate::llm::{sample_model, ChatTransport};

/// What one dispatch produced, whatever the outcome: the contribution row
/// inputs, the arbiter-facing result, and the cost row when the call
/// reached the provider.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub result: AgentResult,
    pub input_prompt: String,
    pub output_text: String,
    pub cost: Option<LlmCostRecord>,
}

/// Renders, calls, parses, validates.
#[derive(Clone)]
pub struct AgentDispatcher {
    transport: Arc<dyn ChatTransport>,
    model_pool: Vec<String>,
}

impl AgentDispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>, model_pool: Vec<String>) -> Self {
        Self {
            transport,
            model_pool,
        }
    }

    /// Run one agent. Transport and parse failures surface as
    /// [`AgentResult::Failed`]; validation failures keep the output with
    /// `valid = false` so the contribution row still records the attempt.
    pub async fn dispatch(
        &self,
        role: AgentRole,
        context: &PromptContext,
        cycle_number: u64,
    ) -> DispatchOutcome {
        let messages = render(role, context);
        let input_prompt = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        // per-call uniform draw; two agents may land on the same model
        let model = {
            let mut rng = StdRng::from_entropy();
            sample_model(&self.model_pool, &mut rng)
        };
        let model = match model {
            Some(model) => model,
            None => {
                return DispatchOutcome {
                    result: AgentResult::Failed {
                        role,
                        reason: "model pool is empty".into(),
                    },
                    input_prompt,
                    output_text: String::new(),
                    cost: None,
                }
            }
        };

        let response = match self.transport.chat(&model, &messages).await {
            Ok(response) => response,
            Err(error) => {
                debug!(role = %role, model = %model, %error, "agent call failed");
                return DispatchOutcome {
                    result: AgentResult::Failed {
                        role,
                        reason: error.to_string(),
                    },
                    input_prompt,
                    output_text: String::new(),
                    cost: None,
                };
            }
        };

        let cost = Some(LlmCostRecord::clamped(
            cycle_number,
            role,
            model.clone(),
            response.usage.input_tokens,
            response.usage.output_tokens,
            response.cost.total_cost,
        ));

        let result = match parse_output(role, context, &response.content) {
            Ok(output) => {
                let delta = resolve_delta(role, &output);
                AgentResult::Reply((role, model, output, delta))
            }
            Err(error) => AgentResult::Failed {
                role,
                reason: error.to_string(),
            },
        };

        DispatchOutcome {
            result,
            input_prompt,
            output_text: response.content,
            cost,
        }
    }
}

// ============================================================================
// PARSING AND VALIDATION
// ============================================================================

/// Pull the first JSON object out of a possibly chatty response.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn string_map(value: &Value, key: &str) -> std::collections::HashMap<String, String> {
    value
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one response against the role schema. `Err` means no JSON could
/// be recovered at all; schema and sanity failures return an output with
/// `valid = false` instead.
pub fn parse_output(
    role: AgentRole,
    context: &PromptContext,
    content: &str,
) -> Result<AgentOutput, EngineError> {
    let json = extract_json(content)
        .ok_or_else(|| EngineError::Parse(format!("no JSON object in {} response", role)))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| EngineError::Parse(format!("{} response: {}", role, e)))?;

    let mut output = AgentOutput {
        valid: value.get("valid").and_then(Value::as_bool).unwrap_or(true),
        summary: string_field(&value, "summary").unwrap_or_default(),
        new_claim: string_field(&value, "new_claim"),
        target_premise: string_field(&value, "target_premise"),
        objection: string_field(&value, "objection"),
        analogy: string_field(&value, "analogy"),
        mapping: string_field(&value, "mapping"),
        framework: string_field(&value, "framework"),
        strengthens: value.get("strengthens").and_then(Value::as_bool),
        direction: value
            .get("direction")
            .and_then(Value::as_i64)
            .map(|d| d.signum() as i8),
        frontier_ideas: value
            .get("frontier_ideas")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        addressed_objections: string_map(&value, "addressed_objections"),
        remaining_gaps: string_map(&value, "remaining_gaps"),
        raw: content.to_string(),
    };

    if output.valid {
        output.valid = sanity_check(role, &output, context);
    }
    Ok(output)
}

/// Role-specific sanity checks. A failure signals "drop me" to the
/// arbiter without losing the contribution record.
fn sanity_check(role: AgentRole, output: &AgentOutput, context: &PromptContext) -> bool {
    match role {
        AgentRole::Explorer => output.new_claim.is_some(),
        AgentRole::Critic => match (&output.target_premise, &output.objection) {
            (Some(target), Some(_)) => {
                // an objection to the conclusion as a whole is not a
                // premise attack
                !target.trim().eq_ignore_ascii_case(context.claim.trim())
            }
            _ => false,
        },
        AgentRole::Connector => output.analogy.is_some() && output.mapping.is_some(),
        AgentRole::Steelman => output.strengthens.is_some(),
        AgentRole::Quantifier => matches!(output.direction, Some(-1) | Some(1)),
        AgentRole::Translator => output.framework.is_some(),
        _ => true,
    }
}

/// Resolve the proposed delta: table magnitude, output-resolved sign for
/// the signed roles.
pub fn resolve_delta(role: AgentRole, output: &AgentOutput) -> f64 {
    let base = role.default_delta();
    if !role.is_signed() {
        return base;
    }
    match role {
        AgentRole::Steelman => match output.strengthens {
            Some(true) | None => base,
            Some(false) => -base,
        },
        AgentRole::Quantifier => match output.direction {
            Some(d) if d < 0 => -base,
            _ => base,
        },
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedTransport;

    fn context() -> PromptContext {
        PromptContext {
            claim: "Prediction markets outperform expert panels".into(),
            support_strength: 0.5,
            cycle_number: 1,
            ..Default::default()
        }
    }

    #[test]
    fn explorer_output_parses_with_proposed_claim() {
        let output = parse_output(
            AgentRole::Explorer,
            &context(),
            r#"{"valid": true, "new_claim": "Liquid prediction markets outperform panels", "summary": "scoped to liquidity"}"#,
        )
        .unwrap();
        assert!(output.valid);
        assert_eq!(
            output.new_claim.as_deref(),
            Some("Liquid prediction markets outperform panels")
        );
    }

    #[test]
    fn chatty_responses_still_parse() {
        let output = parse_output(
            AgentRole::Summarizer,
            &context(),
            "Here is my answer:\n{\"valid\": true, \"summary\": \"holding\"}\nHope that helps!",
        )
        .unwrap();
        assert!(output.valid);
        assert_eq!(output.summary, "holding");
    }

    #[test]
    fn no_json_at_all_is_a_parse_error() {
        let result = parse_output(AgentRole::Historian, &context(), "I decline to answer.");
        assert!(matches!(result, Err(EngineError::Parse(_))));
    }

    #[test]
    fn critic_targeting_whole_claim_is_invalidated() {
        let output = parse_output(
            AgentRole::Critic,
            &context(),
            r#"{"valid": true, "target_premise": "Prediction markets outperform expert panels", "objection": "no they do not"}"#,
        )
        .unwrap();
        assert!(!output.valid);
    }

    #[test]
    fn critic_targeting_a_premise_survives() {
        let output = parse_output(
            AgentRole::Critic,
            &context(),
            r#"{"valid": true, "target_premise": "markets always have liquidity", "objection": "thin markets distort prices"}"#,
        )
        .unwrap();
        assert!(output.valid);
    }

    #[test]
    fn connector_without_mapping_is_invalidated() {
        let output = parse_output(
            AgentRole::Connector,
            &context(),
            r#"{"valid": true, "analogy": "like evolution"}"#,
        )
        .unwrap();
        assert!(!output.valid);
    }

    #[test]
    fn signed_roles_resolve_direction_from_output() {
        let weakens = AgentOutput {
            valid: true,
            strengthens: Some(false),
            ..Default::default()
        };
        assert_eq!(resolve_delta(AgentRole::Steelman, &weakens), -0.08);
        let favors = AgentOutput {
            valid: true,
            direction: Some(1),
            ..Default::default()
        };
        assert_eq!(resolve_delta(AgentRole::Quantifier, &favors), 0.03);
        let against = AgentOutput {
            valid: true,
            direction: Some(-1),
            ..Default::default()
        };
        assert_eq!(resolve_delta(AgentRole::Quantifier, &against), -0.03);
    }

    #[test]
    fn quantifier_without_direction_is_invalidated() {
        let output = parse_output(
            AgentRole::Quantifier,
            &context(),
            r#"{"valid": true, "summary": "roughly double"}"#,
        )
        .unwrap();
        assert!(!output.valid);
    }

    #[tokio::test]
    async fn dispatch_records_cost_and_reply() {
        let transport = Arc::new(ScriptedTransport::new().stub_with_cost(
            "explorer",
            r#"{"valid": true, "new_claim": "A tighter claim entirely"}"#,
            120,
            40,
            0.002,
        ));
        let dispatcher = AgentDispatcher::new(transport, vec!["test-model".into()]);
        let outcome = dispatcher
            .dispatch(AgentRole::Explorer, &context(), 1)
            .await;
        match &outcome.result {
            AgentResult::Reply((role, model, output, delta)) => {
                assert_eq!(*role, AgentRole::Explorer);
                assert_eq!(model, "test-model");
                assert!(output.valid);
                assert_eq!(*delta, 0.10);
            }
            other => panic!("expected reply, got {:?}", other),
        }
        let cost = outcome.cost.unwrap();
        assert_eq!(cost.input_tokens, 120);
        assert_eq!(cost.cost_usd, 0.002);
        assert!(outcome.input_prompt.contains("explorer"));
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed_result_without_cost() {
        let transport = Arc::new(ScriptedTransport::new().fail_when("historian"));
        let dispatcher = AgentDispatcher::new(transport, vec!["test-model".into()]);
        let outcome = dispatcher
            .dispatch(AgentRole::Historian, &context(), 1)
            .await;
        assert!(matches!(outcome.result, AgentResult::Failed { .. }));
        assert!(outcome.cost.is_none());
    }
}
