//! Supervisor journeys: cost ceiling, pause/resume/stop, graduation.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crucible_core::{CycleMode, SessionConfig, Storage};
use crucible_engine::{
    session_topic, EventBus, HashEmbedder, ScriptedTransport, SessionEvent, SessionStatus,
    SessionSupervisor,
};

fn supervisor_with(
    transport: ScriptedTransport,
) -> (SessionSupervisor, Arc<Storage>, Arc<EventBus>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let storage = Arc::new(Storage::new(Some(dir.path().join("e2e.db"))).expect("storage"));
    let events = Arc::new(EventBus::new());
    let supervisor = SessionSupervisor::new(
        storage.clone(),
        Arc::new(transport),
        Arc::new(HashEmbedder),
        events.clone(),
    );
    (supervisor, storage, events, dir)
}

fn quiet_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .stub("explorer", r#"{"valid": false}"#)
        .stub("critic", r#"{"valid": false}"#)
}

fn timed_config() -> SessionConfig {
    SessionConfig {
        cycle_mode: CycleMode::Timed,
        decay_rate: 0.0,
        perturbation_probability: 0.0,
        model_pool: vec!["scripted-model".to_string()],
        ..SessionConfig::default()
    }
}

/// Drain a feed subscribed before the session started until its terminal
/// event arrives, then join the owning task.
async fn wait_for_terminal(
    feed: &mut broadcast::Receiver<SessionEvent>,
    session_id: &str,
    supervisor: &SessionSupervisor,
) -> SessionEvent {
    let event = timeout(Duration::from_secs(30), async {
        loop {
            match feed.recv().await {
                Ok(
                    event @ (SessionEvent::SessionCompleted { .. }
                    | SessionEvent::SessionStopped { .. }),
                ) => return event,
                Ok(_) => continue,
                Err(_) => panic!("event feed closed before a terminal event"),
            }
        }
    })
    .await
    .expect("session did not reach a terminal state in time");
    supervisor.join(session_id).await.expect("join");
    event
}

#[tokio::test]
async fn cost_ceiling_stops_the_session_at_the_next_cycle_boundary() {
    // each agent call costs 0.40; a three-agent cycle spends 1.20, so the
    // first cycle runs and the second is refused at its cost gate
    let transport = ScriptedTransport::new()
        .stub_with_cost("explorer", r#"{"valid": false}"#, 100, 20, 0.40)
        .stub_with_cost("critic", r#"{"valid": false}"#, 100, 20, 0.40)
        .stub_with_cost("summarizer", r#"{"valid": true, "summary": "x"}"#, 100, 20, 0.40);
    let (supervisor, storage, events, _dir) = supervisor_with(transport);
    let mut config = timed_config();
    config.cost_limit_usd = Some(1.0);

    let mut feed = events.subscribe(&session_topic("cost-session"));
    supervisor
        .start_session_with_id("cost-session", "An expensive claim to debate", config)
        .expect("start");
    let event = wait_for_terminal(&mut feed, "cost-session", &supervisor).await;
    match event {
        SessionEvent::SessionStopped { reason, .. } => assert_eq!(reason, "cost_exceeded"),
        other => panic!("expected a stop, got {:?}", other),
    }

    let info = supervisor.info("cost-session").expect("info");
    assert_eq!(info.status, SessionStatus::Stopped);
    assert_eq!(info.cycle_count, 1);
    assert_eq!(info.last_error.as_deref(), Some("Cost limit exceeded"));
    let spent = storage.total_cost_usd(&info.blackboard_id).expect("cost");
    assert!((spent - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn graduation_completes_the_session() {
    // explorer pushes support up every cycle; on the third cycle the
    // connector's delta lands exactly on the graduation threshold
    let transport = ScriptedTransport::new()
        .stub(
            "explorer",
            r#"{"valid": true, "new_claim": "A steadily strengthening claim"}"#,
        )
        .stub("critic", r#"{"valid": false}"#)
        .stub("steelman", r#"{"valid": true, "strengthens": true}"#)
        .stub("connector", r#"{"valid": true, "analogy": "like annealing", "mapping": "slow cooling maps to slow concession"}"#)
        .stub("quantifier", r#"{"valid": true, "direction": 1}"#)
        .stub("Classify", "refinement");
    let (supervisor, storage, events, _dir) = supervisor_with(transport);

    let mut feed = events.subscribe(&session_topic("grad-session"));
    supervisor
        .start_session_with_id("grad-session", "A promising claim", timed_config())
        .expect("start");
    let event = wait_for_terminal(&mut feed, "grad-session", &supervisor).await;
    match event {
        SessionEvent::SessionCompleted { outcome, .. } => assert_eq!(outcome, "graduated"),
        other => panic!("expected completion, got {:?}", other),
    }

    let info = supervisor.info("grad-session").expect("info");
    assert_eq!(info.status, SessionStatus::Completed);
    assert!(info.current_claim.is_none());

    let board = storage.load_blackboard(&info.blackboard_id).expect("load");
    assert_eq!(board.support_strength(), 0.85);
    assert_eq!(board.graduated_claims().len(), 1);
    assert_eq!(
        board.graduated_claims()[0].claim,
        "A steadily strengthening claim"
    );
}

#[tokio::test]
async fn pause_resume_and_stop_drive_the_lifecycle() {
    let (supervisor, _storage, events, _dir) = supervisor_with(quiet_transport());
    let mut config = timed_config();
    config.cycle_mode = CycleMode::EventDriven;

    let mut feed = events.subscribe(&session_topic("ctl-session"));
    supervisor
        .start_session_with_id("ctl-session", "A controllable claim", config)
        .expect("start");
    assert_eq!(
        supervisor.status("ctl-session").expect("status"),
        SessionStatus::Running
    );

    supervisor.pause("ctl-session").expect("pause");
    assert_eq!(
        supervisor.status("ctl-session").expect("status"),
        SessionStatus::Paused
    );

    supervisor.resume("ctl-session").expect("resume");
    assert_eq!(
        supervisor.status("ctl-session").expect("status"),
        SessionStatus::Running
    );

    // one explicit tick, then stop
    supervisor.tick("ctl-session").expect("tick");
    supervisor.stop("ctl-session").expect("stop");
    let event = wait_for_terminal(&mut feed, "ctl-session", &supervisor).await;
    assert!(matches!(event, SessionEvent::SessionStopped { .. }));
    assert_eq!(
        supervisor.status("ctl-session").expect("status"),
        SessionStatus::Stopped
    );
}

#[tokio::test]
async fn duplicate_session_ids_are_rejected() {
    let (supervisor, _storage, _events, _dir) = supervisor_with(quiet_transport());
    let mut config = timed_config();
    config.cycle_mode = CycleMode::EventDriven;
    supervisor
        .start_session_with_id("dup-session", "First claim", config.clone())
        .expect("start");
    assert!(supervisor
        .start_session_with_id("dup-session", "Second claim", config)
        .is_err());
}

#[tokio::test]
async fn delete_session_cascades_the_database() {
    let (supervisor, storage, events, _dir) = supervisor_with(quiet_transport());
    let mut config = timed_config();
    config.max_cycles = 2;

    let mut feed = events.subscribe(&session_topic("del-session"));
    supervisor
        .start_session_with_id("del-session", "A disposable claim", config)
        .expect("start");
    wait_for_terminal(&mut feed, "del-session", &supervisor).await;
    let info = supervisor.info("del-session").expect("info");
    supervisor.delete_session("del-session").await.expect("delete");

    assert!(supervisor.status("del-session").is_err());
    assert!(storage.load_blackboard(&info.blackboard_id).is_err());
    assert!(storage
        .get_snapshots(&info.blackboard_id, 0, 100)
        .expect("snapshots")
        .is_empty());
}
