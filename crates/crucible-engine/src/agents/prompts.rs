//! Role prompt templates
//!
//! Each template renders against the snapshot taken at READ. Outputs are
//! requested as bare JSON; the dispatcher's parser enforces the schema.

use crucible_core::{AgentRole, BlackboardState};

use crate::llm::ChatMessage;

/// Everything a template can reference.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub claim: String,
    pub support_strength: f64,
    pub active_objection: Option<String>,
    pub analogy_of_record: Option<String>,
    pub cycle_number: u64,
    /// Assigned framework for the Translator
    pub translator_framework: Option<String>,
    /// Activated frontier idea for the Perturber
    pub perturbation_seed: Option<String>,
}

impl PromptContext {
    /// Build from a blackboard snapshot; role extras are filled in by the
    /// runner before dispatch.
    pub fn from_state(state: &BlackboardState) -> Self {
        Self {
            claim: state.current_claim.clone().unwrap_or_default(),
            support_strength: state.support_strength,
            active_objection: state.active_objection.clone(),
            analogy_of_record: state.analogy_of_record.clone(),
            cycle_number: state.cycle_count,
            translator_framework: None,
            perturbation_seed: None,
        }
    }

    fn board_block(&self) -> String {
        let mut block = format!(
            "Cycle {}.\nClaim under debate: {}\nSupport strength: {:.2}",
            self.cycle_number, self.claim, self.support_strength
        );
        if let Some(objection) = &self.active_objection {
            block.push_str(&format!("\nStanding objection: {}", objection));
        }
        if let Some(analogy) = &self.analogy_of_record {
            block.push_str(&format!("\nAnalogy of record: {}", analogy));
        }
        block
    }
}

fn system_prompt(role: AgentRole, context: &PromptContext) -> String {
    let charge = match role {
        AgentRole::Explorer => {
            "Propose one sharper version of the claim. Keep what survives scrutiny, \
             replace what does not. Output JSON: {\"valid\": true, \"new_claim\": \"...\", \
             \"summary\": \"...\", \"frontier_ideas\": [\"...\"]}"
                .to_string()
        }
        AgentRole::Critic => {
            "Attack exactly one premise of the claim, never the conclusion as a whole. \
             If you can only object to the conclusion, set valid to false. Output JSON: \
             {\"valid\": true, \"target_premise\": \"...\", \"objection\": \"...\", \
             \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::Connector => {
            "Offer an analogy from another domain with an explicit testable mapping. \
             No mapping, no analogy: set valid to false. Output JSON: {\"valid\": true, \
             \"analogy\": \"...\", \"mapping\": \"...\", \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::Steelman => {
            "Construct the strongest version of whichever side is weaker right now. \
             Report which side came out stronger. Output JSON: {\"valid\": true, \
             \"strengthens\": true, \"summary\": \"...\"} where strengthens is true when \
             the claim side was strengthened and false when the objection side was"
                .to_string()
        }
        AgentRole::Operationalizer => {
            "Turn the claim into a concrete measurable procedure someone could run. \
             Output JSON: {\"valid\": true, \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::Quantifier => {
            "Attach magnitudes: how big, how often, with what confidence. Set direction \
             to 1 when the numbers favor the claim, -1 when they cut against it. \
             Output JSON: {\"valid\": true, \"direction\": 1, \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::Reducer => {
            "Strip the claim to its minimal load-bearing core. Output JSON: \
             {\"valid\": true, \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::BoundaryHunter => {
            "Find where the claim stops holding: domains, scales, or populations where \
             it fails. Output JSON: {\"valid\": true, \"summary\": \"...\", \
             \"frontier_ideas\": [\"...\"]}"
                .to_string()
        }
        AgentRole::Translator => format!(
            "Restate the claim inside the {} framework and report what the restatement \
             exposes. Output JSON: {{\"valid\": true, \"framework\": \"{}\", \
             \"summary\": \"...\"}}",
            context.translator_framework.as_deref().unwrap_or("physics"),
            context.translator_framework.as_deref().unwrap_or("physics"),
        ),
        AgentRole::Historian => {
            "Place the claim in its intellectual lineage: who argued it before, what \
             happened to them. Output JSON: {\"valid\": true, \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::GraveKeeper => {
            "The claim is weak. Argue whether it deserves to die now rather than limp \
             on. Output JSON: {\"valid\": true, \"summary\": \"...\"}"
                .to_string()
        }
        AgentRole::Cartographer => {
            "The debate has stalled. Map the positions taken so far and name the \
             unexplored territory. Output JSON: {\"valid\": true, \"summary\": \"...\", \
             \"frontier_ideas\": [\"...\"]}"
                .to_string()
        }
        AgentRole::Perturber => format!(
            "Inject this activated frontier idea into the debate and say how it \
             reframes the claim: {}. Output JSON: {{\"valid\": true, \"summary\": \"...\"}}",
            context.perturbation_seed.as_deref().unwrap_or("(none)"),
        ),
        AgentRole::Summarizer => {
            "Maintain the running narrative: what the claim now says, which objections \
             were addressed, and what gaps remain. Output JSON: {\"valid\": true, \
             \"summary\": \"...\", \"addressed_objections\": {}, \"remaining_gaps\": {}}"
                .to_string()
        }
        _ => unreachable!("AgentRole is non_exhaustive but all current variants are handled"),
    };
    format!(
        "You are the {} agent in a structured claim deliberation. {} \
         Respond with the JSON object only.",
        role.as_str(),
        charge
    )
}

/// Render the two-message prompt for one role.
pub fn render(role: AgentRole, context: &PromptContext) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(role, context)),
        ChatMessage::user(context.board_block()),
    ]
}
