//! # Crucible Engine
//!
//! Async orchestration for claim deliberation sessions:
//!
//! - **Agent dispatcher**: role prompt templates, JSON output parsing
//!   with role sanity checks, support delta resolution
//! - **Cycle runner**: the READ → WRITE → ARBITER → APPLY → PERTURB →
//!   TRAJECTORY → PERSIST → EMIT state machine, one single-writer task
//!   per session
//! - **Change detector**: transition classification and bounded semantic
//!   diffs between consecutive claim embeddings
//! - **Session supervisor**: process-wide registry with
//!   start/pause/resume/stop/status/info per session
//! - **Event bus**: topic-scoped broadcast for observers
//! - **Transports**: pluggable chat (`HttpChatTransport`,
//!   `ScriptedTransport`) and embedding (`HashEmbedder`) implementations
//!
//! State semantics (clamping, arbitration, frontier pool, persistence)
//! live in `crucible-core`; this crate drives them.

// ============================================================================
// MODULES
// ============================================================================

pub mod agents;
pub mod detector;
pub mod embedder;
pub mod error;
pub mod events;
pub mod llm;
pub mod runner;
pub mod supervisor;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use agents::{parse_output, render, AgentDispatcher, DispatchOutcome, PromptContext};
pub use detector::{AppliedContribution, ChangeDetector};
pub use embedder::{EmbeddingFacade, EmbeddingTransport, HashEmbedder};
pub use error::{EngineError, Result};
pub use events::{session_topic, EventBus, SessionEvent, GLOBAL_TOPIC};
pub use llm::{
    sample_model, ChatCost, ChatMessage, ChatResponse, ChatTransport, HttpChatTransport,
    ScriptedTransport, TokenUsage,
};
pub use runner::{Control, CycleOutcome, CycleRunner, StopReason};
pub use supervisor::{SessionInfo, SessionStatus, SessionSupervisor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
