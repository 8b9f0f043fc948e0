//! Engine error types
//!
//! Per-agent kinds (transport, parse, validation, timeout) drop that
//! agent's contribution but never abort the cycle. Persistence errors are
//! retried next cycle with the latest in-memory state. Cost overruns stop
//! the session cleanly; invariant violations halt it.

use crucible_core::{InvariantViolation, StorageError};

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Network or provider failure on an outbound LLM/embedding call
    #[error("Transport error: {0}")]
    Transport(String),
    /// Agent output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Agent output failed schema or sanity validation
    #[error("Validation error: {0}")]
    Validation(String),
    /// Agent call exceeded its deadline
    #[error("Timeout after {0} ms")]
    Timeout(u64),
    /// Database failure; in-memory state stays authoritative
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
    /// Broken numeric invariant; unrecoverable
    #[error("Invariant error: {0}")]
    Invariant(#[from] InvariantViolation),
    /// Session cost ceiling reached
    #[error("Cost limit exceeded: spent {spent} of {limit} USD")]
    CostExceeded { spent: f64, limit: f64 },
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether this error only drops a single agent contribution.
    pub fn is_agent_scoped(&self) -> bool {
        matches!(
            self,
            EngineError::Transport(_)
                | EngineError::Parse(_)
                | EngineError::Validation(_)
                | EngineError::Timeout(_)
        )
    }
}
