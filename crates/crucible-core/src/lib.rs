//! # Crucible Core
//!
//! State engine for multi-agent claim deliberation:
//!
//! - **Blackboard**: authoritative per-session state with strict numeric
//!   invariants: support clamped to `[0.2, 0.9]`, death at the floor,
//!   graduation at 0.85
//! - **Arbiter**: pure arbitration of a cycle's agent outputs into an
//!   ordered set of accepted contributions
//! - **Frontier pool**: sponsor-weighted reservoir of candidate ideas
//!   with aging and proportional sampling
//! - **Trajectory**: embedded claim snapshots, cosine similarity, and
//!   transition records between consecutive points
//! - **Storage**: SQLite persistence of the blackboard and all of its
//!   child tables
//!
//! The async orchestration layer (cycle runner, agent dispatcher, session
//! supervisor, event bus) lives in `crucible-engine` and drives this crate
//! from a single-writer task per session.

// ============================================================================
// MODULES
// ============================================================================

pub mod arbiter;
pub mod blackboard;
pub mod config;
pub mod roles;
pub mod storage;
pub mod trajectory;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Blackboard state
pub use blackboard::{
    idea_id, Blackboard, BlackboardState, CemeteryEntry, FrontierError, FrontierIdea,
    FrontierPool, GraduatedClaim, InvariantViolation, SupportOutcome, DEATH_BY_DECAY,
    GRADUATION_THRESHOLD, INITIAL_SUPPORT, MAX_CYCLES_ALIVE, MIN_SPONSORS, SUPPORT_CEILING,
    SUPPORT_FLOOR, TRANSLATOR_FRAMEWORKS,
};

// Roles and contributions
pub use roles::{
    AgentContribution, AgentOutput, AgentReply, AgentResult, AgentRole, LlmCostRecord, ALL_ROLES,
};

// Arbitration
pub use arbiter::evaluate;

// Trajectory
pub use trajectory::{
    cosine_similarity, decode_vector, encode_vector, ChangeType, ClaimTransition,
    StagnationTracker, TrajectoryPoint, MAX_DIFF_ITEMS, STAGNATION_WINDOW,
};

// Storage layer
pub use storage::{ClaimSummary, Result, Storage, StorageError};

// Configuration
pub use config::{CycleMode, SessionConfig};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
