//! Shared harness for the end-to-end journey tests.
//!
//! Sessions run against a temp-file SQLite database, the scripted chat
//! transport, and the local hash embedder, so every journey is
//! deterministic and offline.

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;

use crucible_core::{Blackboard, SessionConfig, Storage};
use crucible_engine::{
    Control, CycleOutcome, CycleRunner, EventBus, HashEmbedder, ScriptedTransport,
};

/// A runner wired to throwaway storage; the temp dir lives as long as the
/// harness.
pub struct Harness {
    pub runner: CycleRunner,
    pub storage: Arc<Storage>,
    pub events: Arc<EventBus>,
    pub control: watch::Sender<Control>,
    control_rx: watch::Receiver<Control>,
    _dir: TempDir,
}

impl Harness {
    /// One session around `seed_claim`, driven by `transport`.
    pub fn new(seed_claim: &str, transport: ScriptedTransport, config: SessionConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let storage = Arc::new(Storage::new(Some(dir.path().join("e2e.db"))).expect("storage"));
        let events = Arc::new(EventBus::new());
        let mut board = Blackboard::new("e2e-session", seed_claim);
        board.set_cost_limit_usd(config.cost_limit_usd);
        storage.persist_blackboard(&board).expect("initial persist");
        let runner = CycleRunner::new(
            board,
            config,
            storage.clone(),
            Arc::new(transport),
            Arc::new(HashEmbedder),
            events.clone(),
        );
        let (control, control_rx) = watch::channel(Control::Running);
        Self {
            runner,
            storage,
            events,
            control,
            control_rx,
            _dir: dir,
        }
    }

    /// Drive exactly one cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let mut control = self.control_rx.clone();
        self.runner.run_cycle(&mut control).await.expect("cycle")
    }
}

/// Config matching the literal boundary scenarios: no passive decay, no
/// random perturbation, generous deadlines.
pub fn scenario_config() -> SessionConfig {
    SessionConfig {
        decay_rate: 0.0,
        perturbation_probability: 0.0,
        model_pool: vec!["scripted-model".to_string()],
        ..SessionConfig::default()
    }
}

/// A critic that declines every cycle (objection targets the conclusion).
pub fn silent_critic() -> &'static str {
    r#"{"valid": false}"#
}
