//! Agent roles and their contributions
//!
//! Each debating agent plays one fixed epistemic role. The role decides:
//! - which prompt template the dispatcher renders
//! - the proposed support delta its accepted output carries
//! - its position in the deterministic apply order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// AGENT ROLES
// ============================================================================

/// The fourteen epistemic roles in a deliberation session.
///
/// Declaration order matters: contributions from roles after `Connector`
/// are applied in this order within a cycle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Proposes a refined or replacement claim
    Explorer,
    /// Attacks a specific premise of the current claim
    Critic,
    /// Supplies an analogy with a testable mapping
    Connector,
    /// Strengthens the strongest version of one side
    Steelman,
    /// Turns the claim into a measurable procedure
    Operationalizer,
    /// Attaches magnitudes and confidence intervals
    Quantifier,
    /// Strips the claim to its minimal core
    Reducer,
    /// Probes the edges where the claim stops holding
    BoundaryHunter,
    /// Restates the claim in a foreign framework
    Translator,
    /// Places the claim in its intellectual lineage
    Historian,
    /// Argues for letting a weak claim die
    GraveKeeper,
    /// Maps the debate when it has stopped moving
    Cartographer,
    /// Injects an activated frontier idea
    Perturber,
    /// Maintains the running narrative of the debate
    Summarizer,
}

/// All roles in declaration (apply) order.
pub const ALL_ROLES: [AgentRole; 14] = [
    AgentRole::Explorer,
    AgentRole::Critic,
    AgentRole::Connector,
    AgentRole::Steelman,
    AgentRole::Operationalizer,
    AgentRole::Quantifier,
    AgentRole::Reducer,
    AgentRole::BoundaryHunter,
    AgentRole::Translator,
    AgentRole::Historian,
    AgentRole::GraveKeeper,
    AgentRole::Cartographer,
    AgentRole::Perturber,
    AgentRole::Summarizer,
];

impl AgentRole {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Explorer => "explorer",
            AgentRole::Critic => "critic",
            AgentRole::Connector => "connector",
            AgentRole::Steelman => "steelman",
            AgentRole::Operationalizer => "operationalizer",
            AgentRole::Quantifier => "quantifier",
            AgentRole::Reducer => "reducer",
            AgentRole::BoundaryHunter => "boundary_hunter",
            AgentRole::Translator => "translator",
            AgentRole::Historian => "historian",
            AgentRole::GraveKeeper => "grave_keeper",
            AgentRole::Cartographer => "cartographer",
            AgentRole::Perturber => "perturber",
            AgentRole::Summarizer => "summarizer",
        }
    }

    /// Parse from string name. Unknown names map to `Summarizer`, the only
    /// role whose accepted output is always side-effect free.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "explorer" => AgentRole::Explorer,
            "critic" => AgentRole::Critic,
            "connector" => AgentRole::Connector,
            "steelman" => AgentRole::Steelman,
            "operationalizer" => AgentRole::Operationalizer,
            "quantifier" => AgentRole::Quantifier,
            "reducer" => AgentRole::Reducer,
            "boundary_hunter" => AgentRole::BoundaryHunter,
            "translator" => AgentRole::Translator,
            "historian" => AgentRole::Historian,
            "grave_keeper" => AgentRole::GraveKeeper,
            "cartographer" => AgentRole::Cartographer,
            "perturber" => AgentRole::Perturber,
            _ => AgentRole::Summarizer,
        }
    }

    /// Base support delta magnitude proposed by this role.
    ///
    /// `Steelman` and `Quantifier` are signed: the dispatcher resolves the
    /// sign from the parsed output direction.
    pub fn default_delta(&self) -> f64 {
        match self {
            AgentRole::Explorer => 0.10,
            AgentRole::Critic => -0.15,
            AgentRole::Connector => 0.05,
            AgentRole::Steelman => 0.08,
            AgentRole::Operationalizer => 0.05,
            AgentRole::Quantifier => 0.03,
            AgentRole::Reducer => 0.0,
            AgentRole::BoundaryHunter => -0.05,
            AgentRole::Translator => 0.02,
            AgentRole::Historian => 0.0,
            AgentRole::GraveKeeper => -0.10,
            AgentRole::Cartographer => 0.0,
            AgentRole::Perturber => 0.0,
            AgentRole::Summarizer => 0.0,
        }
    }

    /// Whether the role's delta sign depends on its output.
    pub fn is_signed(&self) -> bool {
        matches!(self, AgentRole::Steelman | AgentRole::Quantifier)
    }

    /// Position in the deterministic apply order.
    pub fn apply_rank(&self) -> usize {
        ALL_ROLES
            .iter()
            .position(|r| r == self)
            .unwrap_or(ALL_ROLES.len())
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// AGENT OUTPUT
// ============================================================================

/// The parsed, schema-checked output of a single agent call.
///
/// `valid` is false whenever schema validation or role-specific sanity
/// checks failed; the arbiter drops such outputs without aborting the cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Passed schema validation and role sanity checks
    pub valid: bool,
    /// One-line summary of the contribution
    pub summary: String,
    /// Explorer: the proposed replacement claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_claim: Option<String>,
    /// Critic: the premise under attack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_premise: Option<String>,
    /// Critic: the objection text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objection: Option<String>,
    /// Connector: the analogy of record candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analogy: Option<String>,
    /// Connector: the testable mapping backing the analogy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,
    /// Translator: the framework the claim was restated in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Steelman: true when the claim side came out stronger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strengthens: Option<bool>,
    /// Quantifier: +1 when the numbers support the claim, -1 against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<i8>,
    /// Any role: candidate ideas sponsored into the frontier pool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frontier_ideas: Vec<String>,
    /// Summarizer: objection text -> how it was addressed
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub addressed_objections: std::collections::HashMap<String, String>,
    /// Summarizer: gap name -> why it still matters
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub remaining_gaps: std::collections::HashMap<String, String>,
    /// The raw model response this output was parsed from
    #[serde(default)]
    pub raw: String,
}

impl AgentOutput {
    /// An output that failed validation, keeping the raw text for the
    /// contribution record.
    pub fn invalid(raw: impl Into<String>) -> Self {
        Self {
            valid: false,
            raw: raw.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

/// One row per invoked agent per cycle, persisted whether or not the
/// arbiter accepted the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContribution {
    /// Database id, 0 until persisted
    pub id: i64,
    pub cycle_number: u64,
    pub agent_role: AgentRole,
    pub model_used: String,
    pub input_prompt: String,
    pub output_text: String,
    pub accepted: bool,
    pub support_delta: f64,
    pub created_at: DateTime<Utc>,
}

/// A successful agent call: role, model drawn from the pool, parsed
/// output, and the proposed support delta.
pub type AgentReply = (AgentRole, String, AgentOutput, f64);

/// What one dispatched agent produced: a reply, or the reason it dropped.
#[derive(Debug, Clone)]
pub enum AgentResult {
    Reply(AgentReply),
    Failed { role: AgentRole, reason: String },
}

impl AgentResult {
    pub fn role(&self) -> AgentRole {
        match self {
            AgentResult::Reply((role, ..)) => *role,
            AgentResult::Failed { role, .. } => *role,
        }
    }
}

/// Per-call LLM usage, clamped non-negative at ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCostRecord {
    pub cycle_number: u64,
    pub agent_role: AgentRole,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
}

impl LlmCostRecord {
    /// Build a record from provider-reported usage, clamping every count
    /// to zero or above.
    pub fn clamped(
        cycle_number: u64,
        agent_role: AgentRole,
        model_used: String,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Self {
        Self {
            cycle_number,
            agent_role,
            model_used,
            input_tokens: input_tokens.max(0),
            output_tokens: output_tokens.max(0),
            cost_usd: cost_usd.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip() {
        for role in ALL_ROLES {
            assert_eq!(AgentRole::parse_name(role.as_str()), role);
        }
    }

    #[test]
    fn unknown_role_falls_back_to_summarizer() {
        assert_eq!(AgentRole::parse_name("oracle"), AgentRole::Summarizer);
    }

    #[test]
    fn delta_table_matches_role_contract() {
        assert_eq!(AgentRole::Explorer.default_delta(), 0.10);
        assert_eq!(AgentRole::Critic.default_delta(), -0.15);
        assert_eq!(AgentRole::GraveKeeper.default_delta(), -0.10);
        assert_eq!(AgentRole::BoundaryHunter.default_delta(), -0.05);
        assert!(AgentRole::Steelman.is_signed());
        assert!(AgentRole::Quantifier.is_signed());
        assert!(!AgentRole::Critic.is_signed());
    }

    #[test]
    fn apply_rank_orders_explorer_critic_connector_first() {
        assert_eq!(AgentRole::Explorer.apply_rank(), 0);
        assert_eq!(AgentRole::Critic.apply_rank(), 1);
        assert_eq!(AgentRole::Connector.apply_rank(), 2);
        assert!(AgentRole::Summarizer.apply_rank() > AgentRole::Perturber.apply_rank());
    }

    #[test]
    fn cost_record_clamps_negative_usage() {
        let cost = LlmCostRecord::clamped(
            3,
            AgentRole::Critic,
            "test-model".into(),
            -10,
            -1,
            -0.5,
        );
        assert_eq!(cost.input_tokens, 0);
        assert_eq!(cost.output_tokens, 0);
        assert_eq!(cost.cost_usd, 0.0);
    }
}
