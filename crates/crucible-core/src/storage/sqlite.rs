//! SQLite Storage Implementation
//!
//! Persists one blackboard per session plus every child table keyed on
//! `blackboard_id`. The in-memory blackboard stays authoritative: a failed
//! save surfaces as an error and the caller re-persists on the next cycle.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::blackboard::{
    Blackboard, BlackboardState, CemeteryEntry, FrontierIdea, FrontierPool, GraduatedClaim,
};
use crate::roles::{AgentContribution, AgentRole, LlmCostRecord};
use crate::trajectory::{decode_vector, encode_vector, ChangeType, ClaimTransition, TrajectoryPoint};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// One claim summary per `(blackboard_id, cycle_number)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSummary {
    pub cycle_number: u64,
    /// Free-text context for agents joining mid-debate
    pub context: String,
    /// Narrative of how the claim evolved to this point
    pub evolution: String,
    /// Objection text -> how it was addressed
    pub addressed_objections: HashMap<String, String>,
    /// Gap name -> why it still matters
    pub remaining_gaps: HashMap<String, String>,
}

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite storage with separate reader/writer connections.
///
/// All methods take `&self`, making Storage `Send + Sync` so the engine
/// can hold an `Arc<Storage>` across session tasks.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Storage {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    /// Create new storage instance. `None` resolves the platform data
    /// directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "crucible", "crucible").ok_or_else(
                    || StorageError::Init("Could not determine project directories".to_string()),
                )?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("crucible.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // BLACKBOARDS
    // ========================================================================

    /// Upsert the blackboard record and synchronize its cemetery,
    /// graduation, and frontier child tables.
    pub fn persist_blackboard(&self, board: &Blackboard) -> Result<()> {
        let state = board.get_state();
        let frameworks = serde_json::to_string(
            &state
                .translator_frameworks_used
                .iter()
                .collect::<BTreeSet<_>>(),
        )?;
        let embedding_blob = state.embedding.as_deref().map(encode_vector);

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO blackboards
                 (id, session_id, current_claim, support_strength, active_objection,
                  analogy_of_record, cycle_count, embedding, translator_frameworks,
                  cost_limit_usd, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 current_claim = excluded.current_claim,
                 support_strength = excluded.support_strength,
                 active_objection = excluded.active_objection,
                 analogy_of_record = excluded.analogy_of_record,
                 cycle_count = excluded.cycle_count,
                 embedding = excluded.embedding,
                 translator_frameworks = excluded.translator_frameworks,
                 cost_limit_usd = excluded.cost_limit_usd,
                 updated_at = excluded.updated_at",
            params![
                state.id,
                state.session_id,
                state.current_claim,
                state.support_strength,
                state.active_objection,
                state.analogy_of_record,
                state.cycle_count as i64,
                embedding_blob,
                frameworks,
                state.cost_limit_usd,
                state.created_at,
                state.updated_at,
            ],
        )?;

        // Child rows are replaced wholesale; the pool is small by design
        conn.execute(
            "DELETE FROM frontier_ideas WHERE blackboard_id = ?1",
            params![state.id],
        )?;
        for idea in state.frontier_pool.iter() {
            let sponsors = serde_json::to_string(&idea.sponsor_ids)?;
            conn.execute(
                "INSERT INTO frontier_ideas
                     (id, blackboard_id, idea_text, sponsor_ids, sponsor_count,
                      cycles_alive, activated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    idea.id,
                    state.id,
                    idea.idea_text,
                    sponsors,
                    idea.sponsor_count as i64,
                    idea.cycles_alive as i64,
                    idea.activated,
                ],
            )?;
        }

        // Cemetery and graduations are append-only: insert the tail the
        // database has not seen yet
        let dead: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cemetery_entries WHERE blackboard_id = ?1",
            params![state.id],
            |row| row.get(0),
        )?;
        // cemetery is most-recent-first in memory; persist oldest-first
        for entry in state.cemetery.iter().rev().skip(dead as usize) {
            conn.execute(
                "INSERT INTO cemetery_entries
                     (blackboard_id, claim, cause_of_death, final_support, cycle_killed, died_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    state.id,
                    entry.claim,
                    entry.cause_of_death,
                    entry.final_support,
                    entry.cycle_killed as i64,
                    entry.died_at,
                ],
            )?;
        }

        let graduated: i64 = conn.query_row(
            "SELECT COUNT(*) FROM graduated_claims WHERE blackboard_id = ?1",
            params![state.id],
            |row| row.get(0),
        )?;
        for entry in state.graduated_claims.iter().skip(graduated as usize) {
            conn.execute(
                "INSERT INTO graduated_claims
                     (blackboard_id, claim, final_support, cycle_graduated, graduated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    state.id,
                    entry.claim,
                    entry.final_support,
                    entry.cycle_graduated as i64,
                    entry.graduated_at,
                ],
            )?;
        }

        Ok(())
    }

    /// Write a full-state snapshot row for the board's current cycle.
    pub fn create_snapshot(&self, board: &Blackboard) -> Result<i64> {
        let state = board.get_state();
        let state_json = serde_json::to_string(&state)?;
        let embedding_blob = state.embedding.as_deref().map(encode_vector);
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO blackboard_snapshots
                 (blackboard_id, cycle_number, state_json, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                state.id,
                state.cycle_count as i64,
                state_json,
                embedding_blob,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Snapshot states within an inclusive cycle range, oldest first.
    pub fn get_snapshots(
        &self,
        blackboard_id: &str,
        from_cycle: u64,
        to_cycle: u64,
    ) -> Result<Vec<BlackboardState>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT state_json FROM blackboard_snapshots
             WHERE blackboard_id = ?1 AND cycle_number BETWEEN ?2 AND ?3
             ORDER BY cycle_number ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![blackboard_id, from_cycle as i64, to_cycle as i64],
            |row| row.get::<_, String>(0),
        )?;
        let mut states = Vec::new();
        for json in rows {
            states.push(serde_json::from_str(&json?)?);
        }
        Ok(states)
    }

    /// Rebuild a blackboard from its record and child tables.
    pub fn load_blackboard(&self, blackboard_id: &str) -> Result<Blackboard> {
        let conn = self.reader()?;
        let (
            session_id,
            current_claim,
            support_strength,
            active_objection,
            analogy_of_record,
            cycle_count,
            embedding_blob,
            frameworks_json,
            cost_limit_usd,
            created_at,
            updated_at,
        ): (
            String,
            Option<String>,
            f64,
            Option<String>,
            Option<String>,
            i64,
            Option<Vec<u8>>,
            String,
            Option<f64>,
            DateTime<Utc>,
            DateTime<Utc>,
        ) = conn
            .query_row(
                "SELECT session_id, current_claim, support_strength, active_objection,
                        analogy_of_record, cycle_count, embedding, translator_frameworks,
                        cost_limit_usd, created_at, updated_at
                 FROM blackboards WHERE id = ?1",
                params![blackboard_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("blackboard {}", blackboard_id)))?;

        let mut stmt = conn.prepare(
            "SELECT id, idea_text, sponsor_ids, sponsor_count, cycles_alive, activated
             FROM frontier_ideas WHERE blackboard_id = ?1",
        )?;
        let ideas = stmt
            .query_map(params![blackboard_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut pool_ideas = Vec::with_capacity(ideas.len());
        for (id, idea_text, sponsors_json, sponsor_count, cycles_alive, activated) in ideas {
            let sponsor_ids: BTreeSet<String> = serde_json::from_str(&sponsors_json)?;
            pool_ideas.push(FrontierIdea {
                id,
                idea_text,
                sponsor_ids,
                sponsor_count: sponsor_count as usize,
                cycles_alive: cycles_alive as u64,
                activated,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT claim, cause_of_death, final_support, cycle_killed, died_at
             FROM cemetery_entries WHERE blackboard_id = ?1 ORDER BY id DESC",
        )?;
        let cemetery = stmt
            .query_map(params![blackboard_id], |row| {
                Ok(CemeteryEntry {
                    claim: row.get(0)?,
                    cause_of_death: row.get(1)?,
                    final_support: row.get(2)?,
                    cycle_killed: row.get::<_, i64>(3)? as u64,
                    died_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT claim, final_support, cycle_graduated, graduated_at
             FROM graduated_claims WHERE blackboard_id = ?1 ORDER BY id ASC",
        )?;
        let graduated_claims = stmt
            .query_map(params![blackboard_id], |row| {
                Ok(GraduatedClaim {
                    claim: row.get(0)?,
                    final_support: row.get(1)?,
                    cycle_graduated: row.get::<_, i64>(2)? as u64,
                    graduated_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let frameworks: BTreeSet<String> = serde_json::from_str(&frameworks_json)?;
        let embedding = embedding_blob.as_deref().and_then(decode_vector);

        let state = BlackboardState {
            id: blackboard_id.to_string(),
            session_id,
            current_claim,
            support_strength,
            active_objection,
            analogy_of_record,
            frontier_pool: FrontierPool::from_ideas(pool_ideas),
            cemetery,
            graduated_claims,
            cycle_count: cycle_count as u64,
            embedding,
            translator_frameworks_used: frameworks.into_iter().collect(),
            cost_limit_usd,
            created_at,
            updated_at,
        };
        Ok(Blackboard::from_state(state))
    }

    /// Blackboard id for a session, if one was ever persisted.
    pub fn blackboard_id_for_session(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.reader()?;
        Ok(conn
            .query_row(
                "SELECT id FROM blackboards WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Delete a blackboard; every child row cascades with it.
    pub fn delete_blackboard(&self, blackboard_id: &str) -> Result<()> {
        let conn = self.writer()?;
        let deleted = conn.execute(
            "DELETE FROM blackboards WHERE id = ?1",
            params![blackboard_id],
        )?;
        if deleted == 0 {
            return Err(StorageError::NotFound(format!(
                "blackboard {}",
                blackboard_id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // CONTRIBUTIONS AND COSTS
    // ========================================================================

    /// Insert a contribution row and return its id.
    pub fn insert_contribution(
        &self,
        blackboard_id: &str,
        contribution: &AgentContribution,
    ) -> Result<i64> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO agent_contributions
                 (blackboard_id, cycle_number, agent_role, model_used, input_prompt,
                  output_text, accepted, support_delta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                blackboard_id,
                contribution.cycle_number as i64,
                contribution.agent_role.as_str(),
                contribution.model_used,
                contribution.input_prompt,
                contribution.output_text,
                contribution.accepted,
                contribution.support_delta,
                contribution.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Contributions for one cycle in insertion order.
    pub fn contributions_for_cycle(
        &self,
        blackboard_id: &str,
        cycle_number: u64,
    ) -> Result<Vec<AgentContribution>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, cycle_number, agent_role, model_used, input_prompt,
                    output_text, accepted, support_delta, created_at
             FROM agent_contributions
             WHERE blackboard_id = ?1 AND cycle_number = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![blackboard_id, cycle_number as i64], |row| {
            Ok(AgentContribution {
                id: row.get(0)?,
                cycle_number: row.get::<_, i64>(1)? as u64,
                agent_role: AgentRole::parse_name(&row.get::<_, String>(2)?),
                model_used: row.get(3)?,
                input_prompt: row.get(4)?,
                output_text: row.get(5)?,
                accepted: row.get(6)?,
                support_delta: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Record one LLM call's usage.
    pub fn record_cost(&self, blackboard_id: &str, cost: &LlmCostRecord) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO llm_costs
                 (blackboard_id, cycle_number, agent_role, model_used,
                  input_tokens, output_tokens, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                blackboard_id,
                cost.cycle_number as i64,
                cost.agent_role.as_str(),
                cost.model_used,
                cost.input_tokens,
                cost.output_tokens,
                cost.cost_usd,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Accumulated cost for a blackboard.
    pub fn total_cost_usd(&self, blackboard_id: &str) -> Result<f64> {
        let conn = self.reader()?;
        Ok(conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0) FROM llm_costs WHERE blackboard_id = ?1",
            params![blackboard_id],
            |row| row.get(0),
        )?)
    }

    // ========================================================================
    // TRAJECTORY
    // ========================================================================

    /// Insert a trajectory point; one per cycle, later writes ignored.
    pub fn insert_trajectory_point(
        &self,
        blackboard_id: &str,
        point: &TrajectoryPoint,
    ) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT OR IGNORE INTO trajectory_points
                 (blackboard_id, cycle_number, embedding, claim_text,
                  support_strength, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                blackboard_id,
                point.cycle_number as i64,
                encode_vector(&point.embedding),
                point.claim_text,
                point.support_strength,
                point.recorded_at,
            ],
        )?;
        Ok(())
    }

    /// The most recent point strictly before `cycle`.
    pub fn previous_trajectory_point(
        &self,
        blackboard_id: &str,
        cycle: u64,
    ) -> Result<Option<TrajectoryPoint>> {
        let conn = self.reader()?;
        let row = conn
            .query_row(
                "SELECT cycle_number, embedding, claim_text, support_strength, recorded_at
                 FROM trajectory_points
                 WHERE blackboard_id = ?1 AND cycle_number < ?2
                 ORDER BY cycle_number DESC LIMIT 1",
                params![blackboard_id, cycle as i64],
                Self::row_to_point,
            )
            .optional()?;
        Ok(row)
    }

    /// All points, oldest first.
    pub fn get_trajectory_points(&self, blackboard_id: &str) -> Result<Vec<TrajectoryPoint>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT cycle_number, embedding, claim_text, support_strength, recorded_at
             FROM trajectory_points
             WHERE blackboard_id = ?1 ORDER BY cycle_number ASC",
        )?;
        let rows = stmt.query_map(params![blackboard_id], Self::row_to_point)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn row_to_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrajectoryPoint> {
        let blob: Vec<u8> = row.get(1)?;
        Ok(TrajectoryPoint {
            cycle_number: row.get::<_, i64>(0)? as u64,
            embedding: decode_vector(&blob).unwrap_or_default(),
            claim_text: row.get(2)?,
            support_strength: row.get(3)?,
            recorded_at: row.get(4)?,
        })
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Insert a transition, idempotently: a re-run with the same
    /// `(blackboard_id, to_cycle)` returns the existing row unchanged.
    pub fn insert_transition(
        &self,
        blackboard_id: &str,
        transition: &ClaimTransition,
    ) -> Result<ClaimTransition> {
        {
            let conn = self.writer()?;
            conn.execute(
                "INSERT OR IGNORE INTO claim_transitions
                     (blackboard_id, from_cycle, to_cycle, previous_claim, new_claim,
                      trigger_agent, trigger_contribution_id, change_type,
                      diff_additions, diff_removals)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    blackboard_id,
                    transition.from_cycle as i64,
                    transition.to_cycle as i64,
                    transition.previous_claim,
                    transition.new_claim,
                    transition.trigger_agent,
                    transition.trigger_contribution_id,
                    transition.change_type.as_str(),
                    serde_json::to_string(&transition.diff_additions)?,
                    serde_json::to_string(&transition.diff_removals)?,
                ],
            )?;
        }
        self.get_transition(blackboard_id, transition.to_cycle)?
            .ok_or_else(|| {
                StorageError::NotFound(format!(
                    "transition for blackboard {} to_cycle {}",
                    blackboard_id, transition.to_cycle
                ))
            })
    }

    /// The transition arriving at `to_cycle`, if recorded.
    pub fn get_transition(
        &self,
        blackboard_id: &str,
        to_cycle: u64,
    ) -> Result<Option<ClaimTransition>> {
        let conn = self.reader()?;
        let row = conn
            .query_row(
                "SELECT from_cycle, to_cycle, previous_claim, new_claim, trigger_agent,
                        trigger_contribution_id, change_type, diff_additions, diff_removals
                 FROM claim_transitions
                 WHERE blackboard_id = ?1 AND to_cycle = ?2",
                params![blackboard_id, to_cycle as i64],
                Self::row_to_transition,
            )
            .optional()?;
        Ok(row)
    }

    /// All transitions, oldest first.
    pub fn get_transitions(&self, blackboard_id: &str) -> Result<Vec<ClaimTransition>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT from_cycle, to_cycle, previous_claim, new_claim, trigger_agent,
                    trigger_contribution_id, change_type, diff_additions, diff_removals
             FROM claim_transitions
             WHERE blackboard_id = ?1 ORDER BY to_cycle ASC",
        )?;
        let rows = stmt.query_map(params![blackboard_id], Self::row_to_transition)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn row_to_transition(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClaimTransition> {
        let additions: String = row.get(7)?;
        let removals: String = row.get(8)?;
        Ok(ClaimTransition {
            from_cycle: row.get::<_, i64>(0)? as u64,
            to_cycle: row.get::<_, i64>(1)? as u64,
            previous_claim: row.get(2)?,
            new_claim: row.get(3)?,
            trigger_agent: row.get(4)?,
            trigger_contribution_id: row.get(5)?,
            change_type: ChangeType::parse_name(&row.get::<_, String>(6)?),
            diff_additions: serde_json::from_str(&additions).unwrap_or_default(),
            diff_removals: serde_json::from_str(&removals).unwrap_or_default(),
        })
    }

    // ========================================================================
    // SUMMARIES
    // ========================================================================

    /// Write a claim summary; the first write for a cycle wins.
    pub fn insert_summary(&self, blackboard_id: &str, summary: &ClaimSummary) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT OR IGNORE INTO claim_summaries
                 (blackboard_id, cycle_number, context, evolution,
                  addressed_objections, remaining_gaps, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                blackboard_id,
                summary.cycle_number as i64,
                summary.context,
                summary.evolution,
                serde_json::to_string(&summary.addressed_objections)?,
                serde_json::to_string(&summary.remaining_gaps)?,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Cycle of the most recent summary, for debouncing.
    pub fn last_summary_cycle(&self, blackboard_id: &str) -> Result<Option<u64>> {
        let conn = self.reader()?;
        let cycle: Option<i64> = conn
            .query_row(
                "SELECT MAX(cycle_number) FROM claim_summaries WHERE blackboard_id = ?1",
                params![blackboard_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(cycle.map(|c| c as u64))
    }

    /// Summary for one cycle.
    pub fn get_summary(
        &self,
        blackboard_id: &str,
        cycle_number: u64,
    ) -> Result<Option<ClaimSummary>> {
        let conn = self.reader()?;
        let row = conn
            .query_row(
                "SELECT cycle_number, context, evolution, addressed_objections, remaining_gaps
                 FROM claim_summaries
                 WHERE blackboard_id = ?1 AND cycle_number = ?2",
                params![blackboard_id, cycle_number as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(match row {
            Some((cycle, context, evolution, objections, gaps)) => Some(ClaimSummary {
                cycle_number: cycle as u64,
                context,
                evolution,
                addressed_objections: serde_json::from_str(&objections).unwrap_or_default(),
                remaining_gaps: serde_json::from_str(&gaps).unwrap_or_default(),
            }),
            None => None,
        })
    }
}
