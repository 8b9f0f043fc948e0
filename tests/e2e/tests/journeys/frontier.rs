//! Frontier pool journeys: shared sponsorship and forced perturbation.

use crucible_core::idea_id;
use crucible_engine::ScriptedTransport;
use crucible_e2e_tests::{scenario_config, silent_critic, Harness};

#[tokio::test]
async fn two_agents_sponsoring_one_text_make_one_eligible_entry() {
    let transport = ScriptedTransport::new()
        .stub(
            "explorer",
            r#"{"valid": true, "new_claim": "A claim with edges", "frontier_ideas": ["treat claims as wagers"]}"#,
        )
        .stub("critic", silent_critic())
        .stub(
            "summarizer",
            r#"{"valid": true, "summary": "tracking", "frontier_ideas": ["treat claims as wagers"]}"#,
        );
    let mut harness = Harness::new("A seed claim", transport, scenario_config());

    harness.run_cycle().await;

    let board = harness.runner.board();
    assert_eq!(board.frontier_pool().len(), 1);
    let eligible = board.get_eligible_frontiers();
    assert_eq!(eligible.len(), 1);
    let idea = eligible[0];
    assert_eq!(idea.sponsor_count, 2);
    assert_eq!(idea.sponsor_ids.len(), 2);
    assert_eq!(idea.id, idea_id("treat claims as wagers"));
    // aged once by the cycle's perturb phase
    assert_eq!(idea.cycles_alive, 1);

    // the pool survives persistence
    let reloaded = harness.storage.load_blackboard(board.id()).unwrap();
    assert_eq!(reloaded.get_eligible_frontiers().len(), 1);
}

#[tokio::test]
async fn stale_objection_forces_a_perturbation() {
    // cycle 1: the critic lands an objection and two agents sponsor the
    // same frontier idea; afterwards every agent declines, so the
    // objection stands untouched until the staleness rule fires
    let transport = ScriptedTransport::new()
        .stub("Standing objection", r#"{"valid": false}"#)
        .stub("explorer", r#"{"valid": false}"#)
        .stub(
            "critic",
            r#"{"valid": true, "target_premise": "the sampling premise", "objection": "sampling is biased", "frontier_ideas": ["inspect the base rate"]}"#,
        )
        .stub(
            "summarizer",
            r#"{"valid": true, "summary": "stuck", "frontier_ideas": ["inspect the base rate"]}"#,
        );
    let mut config = scenario_config();
    // random draw disabled: only the stale-objection rule can fire
    config.perturbation_probability = 0.0;
    let mut harness = Harness::new(
        "A claim that refuses to move and holds its shape",
        transport,
        config,
    );

    // cycle 1 sets the objection (support 0.35); the streak reaches
    // three at cycle 3 and forces the fire
    let mut fired_at = None;
    for cycle in 1..=4u64 {
        harness.run_cycle().await;
        let board = harness.runner.board();
        if board.frontier_pool().iter().any(|idea| idea.activated) {
            fired_at = Some(cycle);
            break;
        }
    }
    assert_eq!(fired_at, Some(3), "stale objection never forced a perturbation");
    assert_eq!(
        harness.runner.board().active_objection(),
        Some("sampling is biased")
    );
}
