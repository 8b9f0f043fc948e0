//! Claim trajectory - embedded snapshots and transitions between them
//!
//! One point per cycle with a live claim. Consecutive points whose cosine
//! similarity drops below the configured threshold produce a
//! [`ClaimTransition`]; three threshold-clearing cycles in a row raise the
//! stagnation signal that summons the Cartographer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// VECTOR MATH AND WIRE FORMAT
// ============================================================================

/// Cosine similarity between two vectors. Zero when the dimensions differ
/// or either norm vanishes.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Serialize a vector as a length-prefixed little-endian f32 blob.
/// Stable across persist/load so stored similarities never drift.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + vector.len() * 4);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_vector`]. `None` on a malformed blob.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let body = &bytes[4..];
    if body.len() != len * 4 {
        return None;
    }
    Some(
        body.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// POINTS AND TRANSITIONS
// ============================================================================

/// One embedded claim snapshot, written per cycle iff the claim is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub cycle_number: u64,
    pub embedding: Vec<f32>,
    pub claim_text: String,
    pub support_strength: f64,
    pub recorded_at: DateTime<Utc>,
}

/// How a claim changed between two trajectory points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Same thesis, tightened wording or scope
    #[default]
    Refinement,
    /// A different thesis entirely
    Pivot,
    /// Broader scope or added commitments
    Expansion,
    /// Narrower scope or dropped commitments
    Contraction,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Refinement => "refinement",
            ChangeType::Pivot => "pivot",
            ChangeType::Expansion => "expansion",
            ChangeType::Contraction => "contraction",
        }
    }

    /// Parse a classifier's answer. Anything unrecognized is a refinement,
    /// the least-committal reading.
    pub fn parse_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pivot" => ChangeType::Pivot,
            "expansion" => ChangeType::Expansion,
            "contraction" => ChangeType::Contraction,
            _ => ChangeType::Refinement,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded semantic transition between consecutive trajectory points.
/// Unique per `(blackboard_id, to_cycle)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub from_cycle: u64,
    pub to_cycle: u64,
    pub previous_claim: String,
    pub new_claim: String,
    /// Role name of the accepted contribution with the largest |delta|
    /// this cycle, or "unknown"
    pub trigger_agent: String,
    /// Database id of that contribution, 0 when unknown
    pub trigger_contribution_id: i64,
    pub change_type: ChangeType,
    /// Bounded semantic-diff phrases, at most five each
    pub diff_additions: Vec<String>,
    pub diff_removals: Vec<String>,
}

/// Maximum items kept in each semantic-diff list.
pub const MAX_DIFF_ITEMS: usize = 5;

// ============================================================================
// STAGNATION
// ============================================================================

/// Cycles without a transition before the Cartographer is summoned.
pub const STAGNATION_WINDOW: u32 = 3;

/// Counts consecutive transition-free cycles. The signal is consumed on
/// read, so the Cartographer fires once per stagnant stretch.
#[derive(Debug, Clone, Default)]
pub struct StagnationTracker {
    quiet_cycles: u32,
    signal: bool,
}

impl StagnationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one cycle's change detection.
    pub fn observe(&mut self, transitioned: bool) {
        if transitioned {
            self.quiet_cycles = 0;
        } else {
            self.quiet_cycles += 1;
            if self.quiet_cycles >= STAGNATION_WINDOW {
                self.signal = true;
                self.quiet_cycles = 0;
            }
        }
    }

    /// Take the signal if raised. Consuming resets it.
    pub fn consume_signal(&mut self) -> bool {
        std::mem::take(&mut self.signal)
    }
}
