//! Session event bus
//!
//! Topic-scoped publish/subscribe on tokio broadcast channels. Every
//! session publishes to its own `session:<id>` topic and mirrors onto the
//! global `sessions` topic; delivery is FIFO per topic.

use chrono::{DateTime, Utc};
use crucible_core::{BlackboardState, CemeteryEntry, GraduatedClaim};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Global topic carrying every session's lifecycle events.
pub const GLOBAL_TOPIC: &str = "sessions";

/// Buffered events per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 1024;

/// Per-session topic name.
pub fn session_topic(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Everything observers can see a session do.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    SessionStarted {
        session_id: String,
        blackboard_id: String,
        timestamp: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    SessionStopped {
        session_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },
    CycleStarted {
        session_id: String,
        cycle_number: u64,
        timestamp: DateTime<Utc>,
    },
    CycleComplete {
        session_id: String,
        cycle_number: u64,
        duration_ms: u64,
        support_strength: f64,
        current_claim: Option<String>,
        timestamp: DateTime<Utc>,
    },
    BlackboardUpdated {
        session_id: String,
        state: Box<BlackboardState>,
        timestamp: DateTime<Utc>,
    },
    ClaimUpdated {
        session_id: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    SupportUpdated {
        session_id: String,
        support_strength: f64,
        timestamp: DateTime<Utc>,
    },
    ClaimDied {
        session_id: String,
        entry: CemeteryEntry,
        timestamp: DateTime<Utc>,
    },
    ClaimGraduated {
        session_id: String,
        entry: GraduatedClaim,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Serialize for wire transports.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Topic table: lazily created broadcast channel per topic.
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, broadcast::Sender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<SessionEvent> {
        let mut topics = self.topics.lock().expect("topic lock");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Subscribe to one topic. Past events are not replayed.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<SessionEvent> {
        self.sender(topic).subscribe()
    }

    /// Publish to one topic. Events with no subscribers are dropped.
    pub fn publish(&self, topic: &str, event: SessionEvent) {
        let _ = self.sender(topic).send(event);
    }

    /// Publish on the session's own topic and mirror onto the global one.
    pub fn publish_session(&self, session_id: &str, event: SessionEvent) {
        self.publish(&session_topic(session_id), event.clone());
        self.publish(GLOBAL_TOPIC, event);
    }
}
