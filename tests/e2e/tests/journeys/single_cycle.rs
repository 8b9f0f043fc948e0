//! Single-cycle journeys: explorer refinement and the critic collision.

use crucible_core::AgentRole;
use crucible_engine::{CycleOutcome, ScriptedTransport};
use crucible_e2e_tests::{scenario_config, silent_critic, Harness};

#[tokio::test]
async fn explorer_refines_the_claim_unopposed() {
    // seed "X" at 0.5; Explorer proposes "Y", no critic targets it
    let transport = ScriptedTransport::new()
        .stub("explorer", r#"{"valid": true, "new_claim": "Y", "summary": "refined"}"#)
        .stub("critic", silent_critic());
    let mut harness = Harness::new("X", transport, scenario_config());

    let outcome = harness.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Continue);

    let board = harness.runner.board();
    assert_eq!(board.current_claim(), Some("Y"));
    assert!((board.support_strength() - 0.60).abs() < 1e-9);
    assert_eq!(board.cycle_count(), 1);

    // one row per invoked agent, explorer accepted
    let contributions = harness
        .storage
        .contributions_for_cycle(board.id(), 1)
        .unwrap();
    assert_eq!(contributions.len(), 3);
    let explorer = contributions
        .iter()
        .find(|c| c.agent_role == AgentRole::Explorer)
        .unwrap();
    assert!(explorer.accepted);
    assert_eq!(explorer.support_delta, 0.10);
    let critic = contributions
        .iter()
        .find(|c| c.agent_role == AgentRole::Critic)
        .unwrap();
    assert!(!critic.accepted);
}

#[tokio::test]
async fn valid_critic_blocks_the_explorer() {
    // the critic attacks the very premise the explorer proposes
    let proposed = "Markets aggregate distributed knowledge";
    let transport = ScriptedTransport::new()
        .stub(
            "explorer",
            &format!(r#"{{"valid": true, "new_claim": "{}"}}"#, proposed),
        )
        .stub(
            "critic",
            &format!(
                r#"{{"valid": true, "target_premise": "{}", "objection": "aggregation assumes honest participation"}}"#,
                proposed
            ),
        );
    let mut harness = Harness::new("Crowds beat individual forecasters", transport, scenario_config());

    let outcome = harness.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Continue);

    let board = harness.runner.board();
    // explorer dropped: claim unchanged, only the critic's delta applied
    assert_eq!(board.current_claim(), Some("Crowds beat individual forecasters"));
    assert!((board.support_strength() - 0.35).abs() < 1e-9);
    assert_eq!(
        board.active_objection(),
        Some("aggregation assumes honest participation")
    );

    let contributions = harness
        .storage
        .contributions_for_cycle(board.id(), 1)
        .unwrap();
    let explorer = contributions
        .iter()
        .find(|c| c.agent_role == AgentRole::Explorer)
        .unwrap();
    assert!(!explorer.accepted);
    let critic = contributions
        .iter()
        .find(|c| c.agent_role == AgentRole::Critic)
        .unwrap();
    assert!(critic.accepted);
    assert_eq!(critic.support_delta, -0.15);
}

#[tokio::test]
async fn passive_decay_applies_before_agent_deltas() {
    let transport = ScriptedTransport::new()
        .stub("explorer", r#"{"valid": true, "new_claim": "A narrower claim"}"#)
        .stub("critic", silent_critic());
    let mut config = scenario_config();
    config.decay_rate = 0.02;
    let mut harness = Harness::new("A broad claim", transport, config);

    harness.run_cycle().await;
    // 0.5 - 0.02 (decay) + 0.10 (explorer)
    assert!((harness.runner.board().support_strength() - 0.58).abs() < 1e-9);
}

#[tokio::test]
async fn failed_agent_drops_without_aborting_the_cycle() {
    let transport = ScriptedTransport::new()
        .stub("explorer", r#"{"valid": true, "new_claim": "Still moving"}"#)
        .fail_when("critic");
    let mut harness = Harness::new("Resilient claim", transport, scenario_config());

    let outcome = harness.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Continue);
    let board = harness.runner.board();
    assert_eq!(board.current_claim(), Some("Still moving"));
    assert!((board.support_strength() - 0.60).abs() < 1e-9);

    // the failed critic still leaves a rejected row
    let contributions = harness
        .storage
        .contributions_for_cycle(board.id(), 1)
        .unwrap();
    let critic = contributions
        .iter()
        .find(|c| c.agent_role == crucible_core::AgentRole::Critic)
        .unwrap();
    assert!(!critic.accepted);
    assert!(critic.output_text.starts_with("error:"));
}

#[tokio::test]
async fn state_survives_a_reload_mid_session() {
    let transport = ScriptedTransport::new()
        .stub("explorer", r#"{"valid": true, "new_claim": "A sharper claim"}"#)
        .stub("critic", silent_critic());
    let mut harness = Harness::new("A plain claim", transport, scenario_config());
    harness.run_cycle().await;
    harness.run_cycle().await;

    let board = harness.runner.board();
    let reloaded = harness.storage.load_blackboard(board.id()).unwrap();
    assert_eq!(reloaded.current_claim(), board.current_claim());
    assert_eq!(reloaded.support_strength(), board.support_strength());
    assert_eq!(reloaded.cycle_count(), board.cycle_count());
    assert_eq!(reloaded.embedding(), board.embedding());
}
