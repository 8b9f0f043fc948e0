//! Frontier pool - sponsor-weighted reservoir of candidate ideas
//!
//! Ideas are content-addressed: the id is the SHA-256 of the idea text,
//! hex-encoded uppercase, so re-sponsoring the same text always lands on
//! the same entry. Entries age every cycle and retire after ten.

use std::collections::{BTreeSet, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An idea retires when `cycles_alive` would exceed this.
pub const MAX_CYCLES_ALIVE: u64 = 10;

/// Sponsors required before an idea becomes eligible for activation.
pub const MIN_SPONSORS: usize = 2;

/// Content-address an idea text: SHA-256, hex, uppercase.
pub fn idea_id(text: &str) -> String {
    use std::fmt::Write;
    let digest = Sha256::digest(text.as_bytes());
    let mut id = String::with_capacity(64);
    for byte in digest {
        let _ = write!(id, "{:02X}", byte);
    }
    id
}

/// One candidate idea awaiting sponsorship and possible activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierIdea {
    pub id: String,
    pub idea_text: String,
    /// Distinct sponsoring agents; BTreeSet keeps serialization stable
    pub sponsor_ids: BTreeSet<String>,
    pub sponsor_count: usize,
    pub cycles_alive: u64,
    pub activated: bool,
}

impl FrontierIdea {
    fn new(text: &str, sponsor_id: &str) -> Self {
        let mut sponsor_ids = BTreeSet::new();
        sponsor_ids.insert(sponsor_id.to_string());
        Self {
            id: idea_id(text),
            idea_text: text.to_string(),
            sponsor_ids,
            sponsor_count: 1,
            cycles_alive: 0,
            activated: false,
        }
    }

    /// Selection weight: sponsorship breadth discounted by age.
    pub fn weight(&self) -> f64 {
        self.sponsor_count as f64 / (self.cycles_alive.max(1) as f64)
    }
}

/// Errors from pool operations that name a specific idea.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FrontierError {
    #[error("Frontier idea not found: {0}")]
    NotFound(String),
    #[error("Frontier idea already activated: {0}")]
    AlreadyActivated(String),
}

/// The reservoir itself. Lives inside the blackboard; every mutation goes
/// through the single-writer runner task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierPool {
    ideas: HashMap<String, FrontierIdea>,
}

impl FrontierPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a pool from persisted entries.
    pub fn from_ideas(ideas: impl IntoIterator<Item = FrontierIdea>) -> Self {
        Self {
            ideas: ideas.into_iter().map(|idea| (idea.id.clone(), idea)).collect(),
        }
    }

    /// Sponsor `text`. Novel text inserts a fresh entry; a new sponsor on
    /// an existing entry grows the sponsor set; a known sponsor is a no-op.
    /// Returns the entry id.
    pub fn add(&mut self, text: &str, sponsor_id: &str) -> String {
        let id = idea_id(text);
        match self.ideas.get_mut(&id) {
            Some(idea) => {
                if idea.sponsor_ids.insert(sponsor_id.to_string()) {
                    idea.sponsor_count = idea.sponsor_ids.len();
                }
            }
            None => {
                self.ideas.insert(id.clone(), FrontierIdea::new(text, sponsor_id));
            }
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<&FrontierIdea> {
        self.ideas.get(id)
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrontierIdea> {
        self.ideas.values()
    }

    /// Entries with enough sponsors that have not yet been activated.
    pub fn eligible(&self) -> Vec<&FrontierIdea> {
        let mut ideas: Vec<&FrontierIdea> = self
            .ideas
            .values()
            .filter(|idea| idea.sponsor_count >= MIN_SPONSORS && !idea.activated)
            .collect();
        // HashMap iteration order is arbitrary; sort for deterministic sampling
        ideas.sort_by(|a, b| a.id.cmp(&b.id));
        ideas
    }

    /// Flip an entry to activated. Fails when absent or already active.
    pub fn activate(&mut self, id: &str) -> Result<&FrontierIdea, FrontierError> {
        let idea = self
            .ideas
            .get_mut(id)
            .ok_or_else(|| FrontierError::NotFound(id.to_string()))?;
        if idea.activated {
            return Err(FrontierError::AlreadyActivated(id.to_string()));
        }
        idea.activated = true;
        Ok(idea)
    }

    /// Age every entry one cycle and retire those past the cap.
    /// Retirement is destructive; returns the retired entries.
    pub fn age(&mut self) -> Vec<FrontierIdea> {
        for idea in self.ideas.values_mut() {
            idea.cycles_alive += 1;
        }
        let retired_ids: Vec<String> = self
            .ideas
            .values()
            .filter(|idea| idea.cycles_alive > MAX_CYCLES_ALIVE)
            .map(|idea| idea.id.clone())
            .collect();
        retired_ids
            .iter()
            .filter_map(|id| self.ideas.remove(id))
            .collect()
    }

    /// Sample an eligible entry with probability proportional to its
    /// weight. `None` when nothing is eligible.
    pub fn select_weighted<R: Rng>(&self, rng: &mut R) -> Option<&FrontierIdea> {
        let eligible = self.eligible();
        if eligible.is_empty() {
            return None;
        }
        let total: f64 = eligible.iter().map(|idea| idea.weight()).sum();
        if total <= 0.0 {
            return eligible.first().copied();
        }
        let mut roll = rng.gen_range(0.0..total);
        for idea in &eligible {
            roll -= idea.weight();
            if roll <= 0.0 {
                return Some(idea);
            }
        }
        eligible.last().copied()
    }
}
