//! Session supervisor
//!
//! Process-wide registry mapping `session_id` to a handle over one owning
//! task. The task drives the cycle runner; the handle exposes
//! start/pause/resume/stop/status/info. Control travels over an explicit
//! watch channel rather than task mailboxes, and all observer traffic
//! goes through the event bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crucible_core::{Blackboard, CycleMode, SessionConfig, Storage};

use crate::embedder::EmbeddingTransport;
use crate::error::{EngineError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::llm::ChatTransport;
use crate::runner::{Control, CycleOutcome, CycleRunner, StopReason};

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Stopped,
    Completed,
}

/// The session info record surfaced to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub blackboard_id: String,
    pub status: SessionStatus,
    pub cycle_count: u64,
    pub support_strength: f64,
    pub current_claim: Option<String>,
    pub last_error: Option<String>,
}

struct SessionHandle {
    blackboard_id: String,
    control: watch::Sender<Control>,
    tick: mpsc::Sender<()>,
    info: Arc<Mutex<SessionInfo>>,
    task: Option<JoinHandle<()>>,
}

/// One supervisor per process; one task per active session.
pub struct SessionSupervisor {
    storage: Arc<Storage>,
    chat: Arc<dyn ChatTransport>,
    embedding: Arc<dyn EmbeddingTransport>,
    events: Arc<EventBus>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionSupervisor {
    pub fn new(
        storage: Arc<Storage>,
        chat: Arc<dyn ChatTransport>,
        embedding: Arc<dyn EmbeddingTransport>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            storage,
            chat,
            embedding,
            events,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Start a session with a generated id.
    pub fn start_session(&self, seed_claim: &str, config: SessionConfig) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.start_session_with_id(&session_id, seed_claim, config)?;
        Ok(session_id)
    }

    /// Start a session under an explicit id. One concurrent session per
    /// id: a second start while the first is registered is rejected.
    pub fn start_session_with_id(
        &self,
        session_id: &str,
        seed_claim: &str,
        config: SessionConfig,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session lock");
        if sessions.contains_key(session_id) {
            return Err(EngineError::Validation(format!(
                "session '{}' already exists",
                session_id
            )));
        }

        let mut board = Blackboard::new(session_id, seed_claim);
        board.set_cost_limit_usd(config.cost_limit_usd);
        let blackboard_id = board.id().to_string();
        if let Err(error) = self.storage.persist_blackboard(&board) {
            warn!(%error, "initial blackboard persist failed; continuing in memory");
        }

        let info = Arc::new(Mutex::new(SessionInfo {
            session_id: session_id.to_string(),
            blackboard_id: blackboard_id.clone(),
            status: SessionStatus::Running,
            cycle_count: 0,
            support_strength: board.support_strength(),
            current_claim: board.current_claim().map(str::to_string),
            last_error: None,
        }));

        let cycle_mode = config.cycle_mode;
        let runner = CycleRunner::new(
            board,
            config,
            self.storage.clone(),
            self.chat.clone(),
            self.embedding.clone(),
            self.events.clone(),
        );

        let (control_tx, control_rx) = watch::channel(Control::Running);
        let (tick_tx, tick_rx) = mpsc::channel(64);

        self.events.publish_session(
            session_id,
            SessionEvent::SessionStarted {
                session_id: session_id.to_string(),
                blackboard_id: blackboard_id.clone(),
                timestamp: Utc::now(),
            },
        );
        info!(session_id, blackboard_id = %blackboard_id, "session started");

        let task = tokio::spawn(session_loop(
            runner,
            control_rx,
            tick_rx,
            cycle_mode,
            info.clone(),
            self.events.clone(),
            session_id.to_string(),
        ));

        sessions.insert(
            session_id.to_string(),
            SessionHandle {
                blackboard_id,
                control: control_tx,
                tick: tick_tx,
                info,
                task: Some(task),
            },
        );
        Ok(())
    }

    fn with_handle<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&SessionHandle) -> T,
    ) -> Result<T> {
        let sessions = self.sessions.lock().expect("session lock");
        let handle = sessions.get(session_id).ok_or_else(|| {
            EngineError::Validation(format!("unknown session '{}'", session_id))
        })?;
        Ok(f(handle))
    }

    /// Request the next cycle in event-driven mode.
    pub fn tick(&self, session_id: &str) -> Result<()> {
        self.with_handle(session_id, |handle| {
            let _ = handle.tick.try_send(());
        })
    }

    pub fn pause(&self, session_id: &str) -> Result<()> {
        self.with_handle(session_id, |handle| {
            let _ = handle.control.send(Control::Paused);
            handle.info.lock().expect("info lock").status = SessionStatus::Paused;
        })?;
        self.events.publish_session(
            session_id,
            SessionEvent::SessionPaused {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn resume(&self, session_id: &str) -> Result<()> {
        self.with_handle(session_id, |handle| {
            let _ = handle.control.send(Control::Running);
            handle.info.lock().expect("info lock").status = SessionStatus::Running;
        })?;
        self.events.publish_session(
            session_id,
            SessionEvent::SessionResumed {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            },
        );
        Ok(())
    }

    /// Request a stop; the runner exits between FSM states.
    pub fn stop(&self, session_id: &str) -> Result<()> {
        self.with_handle(session_id, |handle| {
            let _ = handle.control.send(Control::Stopped);
        })
    }

    pub fn status(&self, session_id: &str) -> Result<SessionStatus> {
        self.with_handle(session_id, |handle| {
            handle.info.lock().expect("info lock").status
        })
    }

    pub fn info(&self, session_id: &str) -> Result<SessionInfo> {
        self.with_handle(session_id, |handle| {
            handle.info.lock().expect("info lock").clone()
        })
    }

    /// Registered session ids, running or finished.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .expect("session lock")
            .keys()
            .cloned()
            .collect()
    }

    /// Wait for a session's task to finish (after stop or completion).
    pub async fn join(&self, session_id: &str) -> Result<()> {
        let task = {
            let mut sessions = self.sessions.lock().expect("session lock");
            sessions
                .get_mut(session_id)
                .ok_or_else(|| {
                    EngineError::Validation(format!("unknown session '{}'", session_id))
                })?
                .task
                .take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    /// Stop a session, drop its registration, and cascade-delete every
    /// persisted row.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let _ = self.stop(session_id);
        self.join(session_id).await?;
        let handle = self
            .sessions
            .lock()
            .expect("session lock")
            .remove(session_id)
            .ok_or_else(|| {
                EngineError::Validation(format!("unknown session '{}'", session_id))
            })?;
        self.storage.delete_blackboard(&handle.blackboard_id)?;
        info!(session_id, "session deleted");
        Ok(())
    }
}

/// The owning task: gate on ticks in event-driven mode, run cycles until
/// a terminal outcome, keep the info record current.
async fn session_loop(
    mut runner: CycleRunner,
    mut control: watch::Receiver<Control>,
    mut tick: mpsc::Receiver<()>,
    cycle_mode: CycleMode,
    info: Arc<Mutex<SessionInfo>>,
    events: Arc<EventBus>,
    session_id: String,
) {
    let final_status = loop {
        // gate between cycles
        {
            let state = *control.borrow();
            match state {
                Control::Stopped => break finish(StopReason::Stopped),
                Control::Paused => {
                    if control.changed().await.is_err() {
                        break finish(StopReason::Stopped);
                    }
                    continue;
                }
                Control::Running => {}
            }
        }
        if cycle_mode == CycleMode::EventDriven {
            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        break finish(StopReason::Stopped);
                    }
                    continue;
                }
                request = tick.recv() => {
                    if request.is_none() {
                        break finish(StopReason::Stopped);
                    }
                }
            }
        }

        match runner.run_cycle(&mut control).await {
            Ok(CycleOutcome::Continue) => {
                update_info(&info, &runner, None);
            }
            Ok(CycleOutcome::Finished(reason)) => {
                update_info(&info, &runner, None);
                break finish(reason);
            }
            Err(error) => {
                // invariant violations are unrecoverable: halt and
                // surface the error on the info record
                error!(%error, "session halted");
                update_info(&info, &runner, Some(error.to_string()));
                break (SessionStatus::Stopped, "invariant".to_string());
            }
        }
    };

    let (status, outcome) = final_status;
    {
        let mut info = info.lock().expect("info lock");
        info.status = status;
        if outcome == "cost_exceeded" && info.last_error.is_none() {
            info.last_error = Some("Cost limit exceeded".to_string());
        }
    }
    match status {
        SessionStatus::Completed => events.publish_session(
            &session_id,
            SessionEvent::SessionCompleted {
                session_id: session_id.clone(),
                outcome,
                timestamp: Utc::now(),
            },
        ),
        _ => events.publish_session(
            &session_id,
            SessionEvent::SessionStopped {
                session_id: session_id.clone(),
                reason: outcome,
                timestamp: Utc::now(),
            },
        ),
    }
}

fn finish(reason: StopReason) -> (SessionStatus, String) {
    let status = match reason {
        StopReason::Graduated | StopReason::Died | StopReason::MaxCycles => {
            SessionStatus::Completed
        }
        StopReason::CostExceeded | StopReason::Stopped => SessionStatus::Stopped,
    };
    (status, reason.as_str().to_string())
}

fn update_info(info: &Arc<Mutex<SessionInfo>>, runner: &CycleRunner, last_error: Option<String>) {
    let board = runner.board();
    let mut info = info.lock().expect("info lock");
    info.cycle_count = board.cycle_count();
    info.support_strength = board.support_strength();
    info.current_claim = board.current_claim().map(str::to_string);
    if last_error.is_some() {
        info.last_error = last_error;
    }
}
