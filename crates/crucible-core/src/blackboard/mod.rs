//! Blackboard - authoritative per-session state
//!
//! One blackboard per deliberation session. It owns the current claim,
//! the support scalar and its clamping rules, the frontier pool, the
//! cemetery and graduation records, and the translator framework ledger.
//!
//! All mutation happens inside the runner's single-writer task; everyone
//! else sees immutable [`BlackboardState`] snapshots. The in-memory
//! blackboard is authoritative; persistence failures never roll it back.

mod frontier;

pub use frontier::{
    idea_id, FrontierError, FrontierIdea, FrontierPool, MAX_CYCLES_ALIVE, MIN_SPONSORS,
};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SUPPORT CONSTANTS
// ============================================================================

/// Hard floor; reaching it kills the claim.
pub const SUPPORT_FLOOR: f64 = 0.2;

/// Hard ceiling for a claim that somehow survives graduation.
pub const SUPPORT_CEILING: f64 = 0.9;

/// Reaching this graduates the claim.
pub const GRADUATION_THRESHOLD: f64 = 0.85;

/// Every session starts here.
pub const INITIAL_SUPPORT: f64 = 0.5;

/// Cause recorded when support decays through the floor.
pub const DEATH_BY_DECAY: &str = "Support decay below threshold";

/// Translator frameworks in fixed rotation order.
pub const TRANSLATOR_FRAMEWORKS: [&str; 5] = [
    "physics",
    "information_theory",
    "economics",
    "biology",
    "mathematics",
];

// ============================================================================
// RECORDS
// ============================================================================

/// A dead claim, appended to the cemetery (most recent first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CemeteryEntry {
    pub claim: String,
    pub cause_of_death: String,
    pub final_support: f64,
    pub cycle_killed: u64,
    pub died_at: DateTime<Utc>,
}

/// A claim that crossed the graduation threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduatedClaim {
    pub claim: String,
    pub final_support: f64,
    pub cycle_graduated: u64,
    pub graduated_at: DateTime<Utc>,
}

/// What a support update did.
#[derive(Debug, Clone, PartialEq)]
pub enum SupportOutcome {
    /// Support moved (possibly clamped to the ceiling); claim unchanged
    Applied { old: f64, new: f64 },
    /// The claim graduated this call
    Graduated { old: f64, entry: GraduatedClaim },
    /// The claim died this call
    Died { old: f64, entry: CemeteryEntry },
}

impl SupportOutcome {
    /// Whether the claim is gone after this update.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SupportOutcome::Applied { .. })
    }
}

/// Broken numeric invariant. Unrecoverable: the session supervisor halts
/// the session when one surfaces.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvariantViolation {
    #[error("support_strength {0} outside [{SUPPORT_FLOOR}, {SUPPORT_CEILING}]")]
    SupportOutOfRange(f64),
    #[error("support at floor but claim still present")]
    FloorWithoutDeath,
    #[error("frontier idea {id}: sponsor_count {count} != |sponsor_ids| {actual}")]
    SponsorCountMismatch {
        id: String,
        count: usize,
        actual: usize,
    },
    #[error("frontier idea {id}: cycles_alive {cycles} exceeds {MAX_CYCLES_ALIVE}")]
    IdeaTooOld { id: String, cycles: u64 },
    #[error("frontier idea id {id} is not the content hash of its text")]
    IdeaIdMismatch { id: String },
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable snapshot of a blackboard, handed to readers and serialized
/// into `blackboard_snapshots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackboardState {
    pub id: String,
    pub session_id: String,
    pub current_claim: Option<String>,
    pub support_strength: f64,
    pub active_objection: Option<String>,
    pub analogy_of_record: Option<String>,
    pub frontier_pool: FrontierPool,
    pub cemetery: Vec<CemeteryEntry>,
    pub graduated_claims: Vec<GraduatedClaim>,
    pub cycle_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub translator_frameworks_used: HashSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_limit_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// BLACKBOARD
// ============================================================================

/// The authoritative session state.
#[derive(Debug, Clone)]
pub struct Blackboard {
    id: String,
    session_id: String,
    current_claim: Option<String>,
    support_strength: f64,
    active_objection: Option<String>,
    analogy_of_record: Option<String>,
    frontier_pool: FrontierPool,
    cemetery: Vec<CemeteryEntry>,
    graduated_claims: Vec<GraduatedClaim>,
    cycle_count: u64,
    embedding: Option<Vec<f32>>,
    translator_frameworks_used: HashSet<String>,
    cost_limit_usd: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Blackboard {
    /// Create a blackboard for a new session around a seed claim.
    pub fn new(session_id: &str, seed_claim: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            current_claim: Some(seed_claim.to_string()),
            support_strength: INITIAL_SUPPORT,
            active_objection: None,
            analogy_of_record: None,
            frontier_pool: FrontierPool::new(),
            cemetery: Vec::new(),
            graduated_claims: Vec::new(),
            cycle_count: 0,
            embedding: None,
            translator_frameworks_used: HashSet::new(),
            cost_limit_usd: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate from a persisted snapshot.
    pub fn from_state(state: BlackboardState) -> Self {
        Self {
            id: state.id,
            session_id: state.session_id,
            current_claim: state.current_claim,
            support_strength: state.support_strength,
            active_objection: state.active_objection,
            analogy_of_record: state.analogy_of_record,
            frontier_pool: state.frontier_pool,
            cemetery: state.cemetery,
            graduated_claims: state.graduated_claims,
            cycle_count: state.cycle_count,
            embedding: state.embedding,
            translator_frameworks_used: state.translator_frameworks_used,
            cost_limit_usd: state.cost_limit_usd,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }

    // ========== Accessors ==========

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_claim(&self) -> Option<&str> {
        self.current_claim.as_deref()
    }

    pub fn support_strength(&self) -> f64 {
        self.support_strength
    }

    pub fn active_objection(&self) -> Option<&str> {
        self.active_objection.as_deref()
    }

    pub fn analogy_of_record(&self) -> Option<&str> {
        self.analogy_of_record.as_deref()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn cemetery(&self) -> &[CemeteryEntry] {
        &self.cemetery
    }

    pub fn graduated_claims(&self) -> &[GraduatedClaim] {
        &self.graduated_claims
    }

    pub fn cost_limit_usd(&self) -> Option<f64> {
        self.cost_limit_usd
    }

    pub fn set_cost_limit_usd(&mut self, limit: Option<f64>) {
        self.cost_limit_usd = limit;
        self.touch();
    }

    /// Immutable snapshot of everything.
    pub fn get_state(&self) -> BlackboardState {
        BlackboardState {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            current_claim: self.current_claim.clone(),
            support_strength: self.support_strength,
            active_objection: self.active_objection.clone(),
            analogy_of_record: self.analogy_of_record.clone(),
            frontier_pool: self.frontier_pool.clone(),
            cemetery: self.cemetery.clone(),
            graduated_claims: self.graduated_claims.clone(),
            cycle_count: self.cycle_count,
            embedding: self.embedding.clone(),
            translator_frameworks_used: self.translator_frameworks_used.clone(),
            cost_limit_usd: self.cost_limit_usd,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    // ========== Mutators ==========

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replace the current claim. Support is untouched.
    pub fn update_claim(&mut self, text: &str) {
        self.current_claim = Some(text.to_string());
        self.touch();
    }

    pub fn set_active_objection(&mut self, text: Option<String>) {
        self.active_objection = text;
        self.touch();
    }

    pub fn set_analogy(&mut self, text: Option<String>) {
        self.analogy_of_record = text;
        self.touch();
    }

    pub fn set_embedding(&mut self, vector: Option<Vec<f32>>) {
        self.embedding = vector;
        self.touch();
    }

    /// Advance the cycle counter. Must run before any mutation whose
    /// semantics reference the cycle index.
    pub fn increment_cycle(&mut self) -> u64 {
        self.cycle_count += 1;
        self.touch();
        self.cycle_count
    }

    /// Apply a support delta under the authoritative clamp order:
    /// graduation, then death, then ceiling, then plain assignment.
    ///
    /// Graduation is checked before the ceiling so a large positive delta
    /// graduates at 0.85 rather than parking at 0.9.
    pub fn update_support(&mut self, delta: f64) -> SupportOutcome {
        let old = self.support_strength;

        // A dead or graduated claim has nothing left to move; keep the
        // scalar inside its band and report a plain application.
        if self.current_claim.is_none() {
            let new = (old + delta).clamp(SUPPORT_FLOOR, SUPPORT_CEILING);
            self.support_strength = new;
            self.touch();
            return SupportOutcome::Applied { old, new };
        }

        let target = old + delta;
        if target >= GRADUATION_THRESHOLD {
            self.support_strength = GRADUATION_THRESHOLD;
            let entry = self.graduate();
            SupportOutcome::Graduated { old, entry }
        } else if target <= SUPPORT_FLOOR {
            self.support_strength = SUPPORT_FLOOR;
            let entry = self
                .kill_claim(DEATH_BY_DECAY)
                .expect("claim checked non-null above");
            SupportOutcome::Died { old, entry }
        } else if target >= SUPPORT_CEILING {
            self.support_strength = SUPPORT_CEILING;
            self.touch();
            SupportOutcome::Applied {
                old,
                new: SUPPORT_CEILING,
            }
        } else {
            self.support_strength = target;
            self.touch();
            SupportOutcome::Applied { old, new: target }
        }
    }

    /// Force-move the current claim to the cemetery with the current
    /// support as `final_support`. `None` when there is no claim to kill.
    pub fn kill_claim(&mut self, cause: &str) -> Option<CemeteryEntry> {
        let claim = self.current_claim.take()?;
        let entry = CemeteryEntry {
            claim,
            cause_of_death: cause.to_string(),
            final_support: self.support_strength,
            cycle_killed: self.cycle_count,
            died_at: Utc::now(),
        };
        // most recent first
        self.cemetery.insert(0, entry.clone());
        self.touch();
        Some(entry)
    }

    fn graduate(&mut self) -> GraduatedClaim {
        let claim = self
            .current_claim
            .take()
            .expect("graduate requires a live claim");
        let entry = GraduatedClaim {
            claim,
            final_support: self.support_strength,
            cycle_graduated: self.cycle_count,
            graduated_at: Utc::now(),
        };
        self.graduated_claims.push(entry.clone());
        self.touch();
        entry
    }

    // ========== Frontier pool ==========

    pub fn frontier_pool(&self) -> &FrontierPool {
        &self.frontier_pool
    }

    pub fn add_frontier_idea(&mut self, text: &str, sponsor_id: &str) -> String {
        let id = self.frontier_pool.add(text, sponsor_id);
        self.touch();
        id
    }

    pub fn get_eligible_frontiers(&self) -> Vec<&FrontierIdea> {
        self.frontier_pool.eligible()
    }

    pub fn activate_frontier(&mut self, id: &str) -> Result<FrontierIdea, FrontierError> {
        let idea = self.frontier_pool.activate(id)?.clone();
        self.touch();
        Ok(idea)
    }

    /// Age the pool one cycle; returns the retired entries.
    pub fn age_frontiers(&mut self) -> Vec<FrontierIdea> {
        let retired = self.frontier_pool.age();
        if !retired.is_empty() {
            self.touch();
        }
        retired
    }

    pub fn select_weighted_frontier<R: Rng>(&self, rng: &mut R) -> Option<FrontierIdea> {
        self.frontier_pool.select_weighted(rng).cloned()
    }

    // ========== Translator frameworks ==========

    /// The first framework in rotation order not yet recorded. When all
    /// five are used, returns the head without clearing the ledger.
    pub fn get_next_translator_framework(&self) -> &'static str {
        TRANSLATOR_FRAMEWORKS
            .iter()
            .find(|f| !self.translator_frameworks_used.contains(**f))
            .copied()
            .unwrap_or(TRANSLATOR_FRAMEWORKS[0])
    }

    pub fn record_translator_framework(&mut self, framework: &str) {
        self.translator_frameworks_used
            .insert(framework.to_string());
        self.touch();
    }

    pub fn translator_frameworks_used(&self) -> &HashSet<String> {
        &self.translator_frameworks_used
    }

    // ========== Invariants ==========

    /// Check every numeric invariant. The runner calls this after APPLY;
    /// a violation is an unrecoverable bug and halts the session.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if !(SUPPORT_FLOOR..=SUPPORT_CEILING).contains(&self.support_strength) {
            return Err(InvariantViolation::SupportOutOfRange(self.support_strength));
        }
        if self.support_strength == SUPPORT_FLOOR
            && (self.current_claim.is_some() || self.cemetery.is_empty())
        {
            return Err(InvariantViolation::FloorWithoutDeath);
        }
        for idea in self.frontier_pool.iter() {
            if idea.sponsor_count != idea.sponsor_ids.len() {
                return Err(InvariantViolation::SponsorCountMismatch {
                    id: idea.id.clone(),
                    count: idea.sponsor_count,
                    actual: idea.sponsor_ids.len(),
                });
            }
            if idea.cycles_alive > MAX_CYCLES_ALIVE {
                return Err(InvariantViolation::IdeaTooOld {
                    id: idea.id.clone(),
                    cycles: idea.cycles_alive,
                });
            }
            if idea.id != idea_id(&idea.idea_text) {
                return Err(InvariantViolation::IdeaIdMismatch {
                    id: idea.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Blackboard {
        Blackboard::new("session-1", "Prediction markets outperform expert panels")
    }

    #[test]
    fn new_board_starts_at_initial_support() {
        let bb = board();
        assert_eq!(bb.support_strength(), INITIAL_SUPPORT);
        assert_eq!(bb.cycle_count(), 0);
        assert!(bb.current_claim().is_some());
        assert!(bb.check_invariants().is_ok());
    }

    #[test]
    fn plain_delta_moves_support() {
        let mut bb = board();
        match bb.update_support(0.10) {
            SupportOutcome::Applied { old, new } => {
                assert_eq!(old, 0.5);
                assert!((new - 0.6).abs() < 1e-9);
            }
            other => panic!("expected plain application, got {:?}", other),
        }
        assert!(bb.current_claim().is_some());
    }

    #[test]
    fn large_positive_delta_graduates_at_threshold() {
        let mut bb = board();
        let outcome = bb.update_support(0.40);
        match outcome {
            SupportOutcome::Graduated { old, entry } => {
                assert_eq!(old, 0.5);
                assert_eq!(entry.final_support, GRADUATION_THRESHOLD);
            }
            other => panic!("expected graduation, got {:?}", other),
        }
        assert_eq!(bb.support_strength(), GRADUATION_THRESHOLD);
        assert!(bb.current_claim().is_none());
        assert_eq!(bb.graduated_claims().len(), 1);
    }

    #[test]
    fn graduation_beats_ceiling() {
        // +1.00 lands far past 0.9; graduation must win
        let mut bb = board();
        let outcome = bb.update_support(1.00);
        assert!(matches!(outcome, SupportOutcome::Graduated { .. }));
        assert_eq!(bb.support_strength(), GRADUATION_THRESHOLD);
    }

    #[test]
    fn large_negative_delta_kills_at_floor() {
        let mut bb = board();
        let outcome = bb.update_support(-0.40);
        match outcome {
            SupportOutcome::Died { old, entry } => {
                assert_eq!(old, 0.5);
                assert_eq!(entry.final_support, SUPPORT_FLOOR);
                assert_eq!(entry.cause_of_death, DEATH_BY_DECAY);
                assert_eq!(entry.cycle_killed, 0);
            }
            other => panic!("expected death, got {:?}", other),
        }
        assert!(bb.current_claim().is_none());
        assert_eq!(bb.cemetery().len(), 1);
        assert!(bb.check_invariants().is_ok());
    }

    #[test]
    fn update_after_death_only_clamps() {
        let mut bb = board();
        bb.update_support(-0.40);
        let outcome = bb.update_support(0.30);
        assert!(matches!(outcome, SupportOutcome::Applied { .. }));
        assert!(bb.current_claim().is_none());
        assert_eq!(bb.cemetery().len(), 1);
    }

    #[test]
    fn kill_claim_records_current_support() {
        let mut bb = board();
        bb.update_support(-0.05);
        let entry = bb.kill_claim("Grave keeper verdict").unwrap();
        assert!((entry.final_support - 0.45).abs() < 1e-9);
        assert_eq!(entry.cause_of_death, "Grave keeper verdict");
        assert!(bb.kill_claim("again").is_none());
    }

    #[test]
    fn cemetery_orders_most_recent_first() {
        let mut bb = board();
        bb.kill_claim("first death");
        bb.update_claim("Second claim");
        bb.kill_claim("second death");
        assert_eq!(bb.cemetery()[0].cause_of_death, "second death");
        assert_eq!(bb.cemetery()[1].cause_of_death, "first death");
    }

    #[test]
    fn translator_frameworks_cycle_in_declaration_order() {
        let mut bb = board();
        for expected in TRANSLATOR_FRAMEWORKS {
            assert_eq!(bb.get_next_translator_framework(), expected);
            bb.record_translator_framework(expected);
        }
        // exhausted: head again, ledger untouched
        assert_eq!(bb.get_next_translator_framework(), "physics");
        assert_eq!(bb.translator_frameworks_used().len(), 5);
    }

    #[test]
    fn snapshot_round_trips_through_serde() {
        let mut bb = board();
        bb.increment_cycle();
        bb.update_support(0.1);
        bb.set_active_objection(Some("premise two is circular".into()));
        bb.add_frontier_idea("claims as bets", "explorer");
        bb.add_frontier_idea("claims as bets", "critic");
        bb.record_translator_framework("physics");
        let state = bb.get_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: BlackboardState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        let rebuilt = Blackboard::from_state(back);
        assert_eq!(rebuilt.support_strength(), bb.support_strength());
        assert_eq!(rebuilt.cycle_count(), bb.cycle_count());
        assert_eq!(rebuilt.frontier_pool().len(), 1);
    }

    #[test]
    fn invariant_check_catches_sponsor_mismatch() {
        let mut bb = board();
        bb.add_frontier_idea("idea", "a");
        let mut state = bb.get_state();
        // corrupt the snapshot and rebuild
        let id = idea_id("idea");
        let json = serde_json::to_string(&state.frontier_pool).unwrap();
        let mut pool: serde_json::Value = serde_json::from_str(&json).unwrap();
        pool["ideas"][&id]["sponsor_count"] = serde_json::json!(5);
        state.frontier_pool = serde_json::from_value(pool).unwrap();
        let corrupt = Blackboard::from_state(state);
        assert!(matches!(
            corrupt.check_invariants(),
            Err(InvariantViolation::SponsorCountMismatch { .. })
        ));
    }
}
