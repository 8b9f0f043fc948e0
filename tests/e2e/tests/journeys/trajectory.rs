//! Trajectory journeys: points per cycle and transition detection.

use crucible_core::ChangeType;
use crucible_engine::ScriptedTransport;
use crucible_e2e_tests::{scenario_config, silent_critic, Harness};

#[tokio::test]
async fn semantic_break_records_one_classified_transition() {
    // cycle 1 rewrites the seed; cycle 2 pivots to unrelated wording, so
    // the cosine between consecutive points collapses
    let transport = ScriptedTransport::new()
        .stub(
            "debate: Tides are driven mostly by lunar gravity",
            r#"{"valid": true, "new_claim": "Coastal tides follow lunar gravitational pull"}"#,
        )
        .stub(
            "debate: Coastal tides follow lunar gravitational pull",
            r#"{"valid": true, "new_claim": "Fermented foods improve gut biodiversity outcomes"}"#,
        )
        .stub("critic", silent_critic())
        .stub("Classify", "pivot")
        .stub(
            "added and removed",
            r#"{"additions": ["dietary framing"], "removals": ["orbital mechanics framing"]}"#,
        );
    let mut harness = Harness::new(
        "Tides are driven mostly by lunar gravity",
        transport,
        scenario_config(),
    );

    harness.run_cycle().await;
    harness.run_cycle().await;

    let board = harness.runner.board();
    let points = harness.storage.get_trajectory_points(board.id()).unwrap();
    assert_eq!(points.len(), 2);

    let transitions = harness.storage.get_transitions(board.id()).unwrap();
    assert_eq!(transitions.len(), 1);
    let transition = &transitions[0];
    assert_eq!(transition.from_cycle, 1);
    assert_eq!(transition.to_cycle, 2);
    assert_eq!(transition.change_type, ChangeType::Pivot);
    assert_eq!(
        transition.new_claim,
        "Fermented foods improve gut biodiversity outcomes"
    );
    // explorer's +0.10 is the cycle's largest accepted delta
    assert_eq!(transition.trigger_agent, "explorer");
    assert!(transition.trigger_contribution_id > 0);
    assert_eq!(transition.diff_additions, vec!["dietary framing"]);
}

#[tokio::test]
async fn unchanged_claim_records_points_but_no_transition() {
    // explorer declines every cycle, so the claim and its embedding are
    // identical across points
    let transport = ScriptedTransport::new()
        .stub("explorer", r#"{"valid": false}"#)
        .stub("critic", silent_critic());
    let mut harness = Harness::new("A perfectly stable claim", transport, scenario_config());

    harness.run_cycle().await;
    harness.run_cycle().await;
    harness.run_cycle().await;

    let board = harness.runner.board();
    assert_eq!(harness.storage.get_trajectory_points(board.id()).unwrap().len(), 3);
    assert!(harness.storage.get_transitions(board.id()).unwrap().is_empty());
}

#[tokio::test]
async fn detect_changes_rerun_is_idempotent() {
    let transport = ScriptedTransport::new()
        .stub(
            "debate: Original phrasing about markets",
            r#"{"valid": true, "new_claim": "Shifted phrasing about market dynamics"}"#,
        )
        .stub(
            "debate: Shifted phrasing about market dynamics",
            r#"{"valid": true, "new_claim": "Unrelated phrasing about fermentation cultures"}"#,
        )
        .stub("critic", silent_critic())
        .stub("Classify", "pivot");
    let mut harness = Harness::new("Original phrasing about markets", transport, scenario_config());

    harness.run_cycle().await;
    harness.run_cycle().await;

    let board_id = harness.runner.board().id().to_string();
    let first = harness.storage.get_transitions(&board_id).unwrap();
    assert_eq!(first.len(), 1);

    // re-inserting the same detected transition returns the stored row
    let replay = harness
        .storage
        .insert_transition(&board_id, &first[0])
        .unwrap();
    assert_eq!(replay, first[0]);
    assert_eq!(harness.storage.get_transitions(&board_id).unwrap().len(), 1);
}
