//! Arbiter - turns a cycle's raw agent results into the ordered set of
//! accepted contributions
//!
//! Pure: no blackboard mutation here. The runner applies the returned
//! deltas serially, and because support clamping is order-sensitive the
//! ordering produced here is part of the contract:
//! Explorer, Critic, Connector, then the remaining roles in declaration
//! order.

use crate::blackboard::BlackboardState;
use crate::roles::{AgentReply, AgentResult, AgentRole};

/// Minimum trimmed length for a critic target to match an explorer's
/// proposed claim. Kept intentionally strict; looser semantic similarity
/// belongs to trajectory detection, not arbitration.
const PREMISE_MATCH_MIN_LEN: usize = 5;

/// Case- and whitespace-insensitive exact equality, gated on a minimum
/// trimmed length for both sides.
fn premise_collides(target: &str, claim: &str, min_len: usize) -> bool {
    let target = target.trim();
    let claim = claim.trim();
    if target.len() < min_len || claim.len() < min_len || target.is_empty() || claim.is_empty() {
        return false;
    }
    target.to_lowercase() == claim.to_lowercase()
}

/// Whether a valid critic blocks this explorer output.
///
/// Two targets block: the explorer's proposed claim itself (strict,
/// length-gated), and the snapshot claim the exploration transformed
/// (a critic undercutting the premise invalidates what was built on it).
fn critic_blocks_explorer(
    critic_target: &str,
    proposed_claim: &str,
    snapshot_claim: Option<&str>,
) -> bool {
    if premise_collides(critic_target, proposed_claim, PREMISE_MATCH_MIN_LEN) {
        return true;
    }
    match snapshot_claim {
        Some(claim) => premise_collides(critic_target, claim, 1),
        None => false,
    }
}

/// Evaluate one cycle's results against the snapshot taken at READ.
///
/// Errors in `results` were already counted against their agents; they
/// simply never become contributions. Proposed deltas pass through
/// unchanged.
pub fn evaluate(results: &[AgentResult], state: &BlackboardState) -> Vec<AgentReply> {
    let valid_critic_targets: Vec<&str> = results
        .iter()
        .filter_map(|result| match result {
            AgentResult::Reply((AgentRole::Critic, _, output, _)) if output.valid => {
                output.target_premise.as_deref()
            }
            _ => None,
        })
        .collect();

    let mut accepted: Vec<AgentReply> = results
        .iter()
        .filter_map(|result| {
            let (role, model, output, delta) = match result {
                AgentResult::Reply(reply) => reply,
                AgentResult::Failed { .. } => return None,
            };
            if !output.valid {
                return None;
            }
            let keep = match role {
                AgentRole::Explorer => match output.new_claim.as_deref() {
                    Some(proposed) => !valid_critic_targets.iter().any(|target| {
                        critic_blocks_explorer(target, proposed, state.current_claim.as_deref())
                    }),
                    None => false,
                },
                // valid=false critics were filtered above: an invalid one
                // signalled "objection targets conclusion, not premise"
                _ => true,
            };
            keep.then(|| (*role, model.clone(), output.clone(), *delta))
        })
        .collect();

    // stable: within a role bucket, collection order is insertion order
    accepted.sort_by_key(|(role, ..)| role.apply_rank());
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::roles::AgentOutput;

    fn snapshot(claim: &str) -> BlackboardState {
        Blackboard::new("session", claim).get_state()
    }

    fn reply(role: AgentRole, output: AgentOutput) -> AgentResult {
        let delta = role.default_delta();
        AgentResult::Reply((role, "test-model".into(), output, delta))
    }

    fn explorer(new_claim: &str) -> AgentResult {
        reply(
            AgentRole::Explorer,
            AgentOutput {
                valid: true,
                new_claim: Some(new_claim.into()),
                ..Default::default()
            },
        )
    }

    fn critic(target: &str) -> AgentResult {
        reply(
            AgentRole::Critic,
            AgentOutput {
                valid: true,
                target_premise: Some(target.into()),
                objection: Some("the premise assumes its conclusion".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn explorer_accepted_when_no_critic_targets_it() {
        let state = snapshot("X");
        let results = [explorer("Y")];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, AgentRole::Explorer);
        assert_eq!(accepted[0].3, 0.10);
    }

    #[test]
    fn critic_on_current_claim_drops_explorer() {
        // critic attacks the very premise the exploration transformed
        let state = snapshot("X");
        let results = [explorer("Y"), critic("X")];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, AgentRole::Critic);
        assert_eq!(accepted[0].3, -0.15);
    }

    #[test]
    fn critic_on_proposed_claim_drops_explorer() {
        let state = snapshot("Old claim about markets");
        let results = [
            explorer("Markets aggregate distributed knowledge"),
            critic("  markets aggregate distributed knowledge  "),
        ];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, AgentRole::Critic);
    }

    #[test]
    fn short_target_does_not_match_proposed_claim() {
        // length gate: a four-char target cannot strictly name a premise
        let state = snapshot("Some standing claim");
        let results = [explorer("Mark"), critic("mark")];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn invalid_critic_blocks_nothing_and_is_dropped() {
        let state = snapshot("X");
        let invalid_critic = reply(
            AgentRole::Critic,
            AgentOutput {
                valid: false,
                target_premise: Some("X".into()),
                ..Default::default()
            },
        );
        let results = [explorer("Y"), invalid_critic];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, AgentRole::Explorer);
    }

    #[test]
    fn failed_results_never_become_contributions() {
        let state = snapshot("X");
        let results = [
            AgentResult::Failed {
                role: AgentRole::Summarizer,
                reason: "deadline".into(),
            },
            explorer("Y"),
        ];
        let accepted = evaluate(&results, &state);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn output_ordered_explorer_critic_connector_then_declaration_order() {
        let state = snapshot("Claim under debate");
        let connector = reply(
            AgentRole::Connector,
            AgentOutput {
                valid: true,
                analogy: Some("like load balancing".into()),
                mapping: Some("requests map to trades".into()),
                ..Default::default()
            },
        );
        let translator = reply(
            AgentRole::Translator,
            AgentOutput {
                valid: true,
                framework: Some("physics".into()),
                ..Default::default()
            },
        );
        let steelman = reply(
            AgentRole::Steelman,
            AgentOutput {
                valid: true,
                strengthens: Some(true),
                ..Default::default()
            },
        );
        let results = [
            translator,
            steelman,
            connector,
            critic("unrelated premise"),
            explorer("A sharper claim"),
        ];
        let accepted = evaluate(&results, &state);
        let roles: Vec<AgentRole> = accepted.iter().map(|(role, ..)| *role).collect();
        assert_eq!(
            roles,
            vec![
                AgentRole::Explorer,
                AgentRole::Critic,
                AgentRole::Connector,
                AgentRole::Steelman,
                AgentRole::Translator,
            ]
        );
    }

    #[test]
    fn explorer_without_proposal_is_dropped() {
        let state = snapshot("X");
        let empty_explorer = reply(
            AgentRole::Explorer,
            AgentOutput {
                valid: true,
                new_claim: None,
                ..Default::default()
            },
        );
        let accepted = evaluate(&[empty_explorer], &state);
        assert!(accepted.is_empty());
    }
}
