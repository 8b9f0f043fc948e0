//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: blackboards and per-cycle child tables",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Claim summaries and llm cost accounting",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: blackboards plus every child table keyed on blackboard_id.
/// All child rows cascade-delete with their blackboard.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);
INSERT INTO schema_version (version, applied_at)
SELECT 0, datetime('now') WHERE NOT EXISTS (SELECT 1 FROM schema_version);

CREATE TABLE IF NOT EXISTS blackboards (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE,
    current_claim TEXT,
    support_strength REAL NOT NULL DEFAULT 0.5,
    active_objection TEXT,
    analogy_of_record TEXT,
    cycle_count INTEGER NOT NULL DEFAULT 0,
    embedding BLOB,
    translator_frameworks TEXT NOT NULL DEFAULT '[]',
    cost_limit_usd REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blackboard_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    cycle_number INTEGER NOT NULL,
    state_json TEXT NOT NULL,
    embedding BLOB,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_board_cycle
    ON blackboard_snapshots(blackboard_id, cycle_number);

CREATE TABLE IF NOT EXISTS agent_contributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    cycle_number INTEGER NOT NULL,
    agent_role TEXT NOT NULL,
    model_used TEXT NOT NULL,
    input_prompt TEXT NOT NULL,
    output_text TEXT NOT NULL,
    accepted INTEGER NOT NULL DEFAULT 0,
    support_delta REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contributions_board_cycle
    ON agent_contributions(blackboard_id, cycle_number);

CREATE TABLE IF NOT EXISTS cemetery_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    claim TEXT NOT NULL,
    cause_of_death TEXT NOT NULL,
    final_support REAL NOT NULL,
    cycle_killed INTEGER NOT NULL,
    died_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS graduated_claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    claim TEXT NOT NULL,
    final_support REAL NOT NULL,
    cycle_graduated INTEGER NOT NULL,
    graduated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS frontier_ideas (
    id TEXT NOT NULL,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    idea_text TEXT NOT NULL,
    sponsor_ids TEXT NOT NULL DEFAULT '[]',
    sponsor_count INTEGER NOT NULL DEFAULT 1,
    cycles_alive INTEGER NOT NULL DEFAULT 0,
    activated INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (blackboard_id, id)
);

CREATE TABLE IF NOT EXISTS trajectory_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    cycle_number INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    claim_text TEXT NOT NULL,
    support_strength REAL NOT NULL,
    recorded_at TEXT NOT NULL,
    UNIQUE (blackboard_id, cycle_number)
);

CREATE TABLE IF NOT EXISTS claim_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    from_cycle INTEGER NOT NULL,
    to_cycle INTEGER NOT NULL,
    previous_claim TEXT NOT NULL,
    new_claim TEXT NOT NULL,
    trigger_agent TEXT NOT NULL DEFAULT 'unknown',
    trigger_contribution_id INTEGER NOT NULL DEFAULT 0,
    change_type TEXT NOT NULL DEFAULT 'refinement',
    diff_additions TEXT NOT NULL DEFAULT '[]',
    diff_removals TEXT NOT NULL DEFAULT '[]',
    UNIQUE (blackboard_id, to_cycle),
    CHECK (to_cycle > from_cycle)
);

UPDATE schema_version SET version = 1, applied_at = datetime('now');
"#;

/// V2: summaries and cost rows.
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS claim_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    cycle_number INTEGER NOT NULL,
    context TEXT NOT NULL,
    evolution TEXT NOT NULL,
    addressed_objections TEXT NOT NULL DEFAULT '{}',
    remaining_gaps TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE (blackboard_id, cycle_number)
);

CREATE TABLE IF NOT EXISTS llm_costs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blackboard_id TEXT NOT NULL REFERENCES blackboards(id) ON DELETE CASCADE,
    cycle_number INTEGER NOT NULL,
    agent_role TEXT NOT NULL,
    model_used TEXT NOT NULL,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_costs_board ON llm_costs(blackboard_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get the current schema version from the database
fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(0);
    }
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
}

/// Apply all pending migrations. Returns the number applied.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
