//! Storage Module
//!
//! SQLite-based persistence for blackboards and every child table:
//! snapshots, contributions, cemetery entries, graduated claims,
//! frontier ideas, trajectory points, claim transitions, summaries,
//! and LLM cost rows. All child rows cascade-delete with the blackboard.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, MIGRATIONS};
pub use sqlite::{ClaimSummary, Result, Storage, StorageError};
