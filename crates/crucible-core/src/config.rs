//! Session configuration
//!
//! Every knob recognized by the runner and supervisor, with the same
//! defaults whether built in code or resolved from `CRUCIBLE_*` env vars.

use serde::{Deserialize, Serialize};

/// How the runner advances from one cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    /// Advance on explicit `tick()` requests
    #[default]
    EventDriven,
    /// Advance on the wall-clock cycle budget
    Timed,
}

/// Configuration for one deliberation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard stop after this many cycles
    pub max_cycles: u64,
    /// Event-driven or timed cycle advancement
    pub cycle_mode: CycleMode,
    /// Per-cycle wall-clock budget in milliseconds
    pub cycle_timeout_ms: u64,
    /// Models the dispatcher samples from, one independent draw per agent
    pub model_pool: Vec<String>,
    /// Passive support decrement applied as the first implicit
    /// contribution of every APPLY phase
    pub decay_rate: f64,
    /// Cosine cutoff below which a claim transition is recorded
    pub similarity_threshold: f32,
    /// Minimum cycles between claim summary writes (0 = every cycle)
    pub summarizer_debounce_cycles: u64,
    /// Independent per-cycle probability of firing a frontier perturbation
    pub perturbation_probability: f64,
    /// Optional hard budget; checked at the top of every cycle
    pub cost_limit_usd: Option<f64>,
    /// Floor for the per-agent call deadline in milliseconds
    pub agent_call_floor_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            cycle_mode: CycleMode::EventDriven,
            cycle_timeout_ms: 300_000,
            model_pool: vec!["deliberator-small".to_string()],
            decay_rate: 0.02,
            similarity_threshold: 0.95,
            summarizer_debounce_cycles: 0,
            perturbation_probability: 0.20,
            cost_limit_usd: None,
            agent_call_floor_ms: 30_000,
        }
    }
}

impl SessionConfig {
    /// Resolve a config from `CRUCIBLE_*` env vars over the defaults.
    ///
    /// `CRUCIBLE_MODEL_POOL` is a comma-separated list; unparsable values
    /// fall back to the default silently.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("CRUCIBLE_MAX_CYCLES") {
            if let Ok(n) = v.parse() {
                config.max_cycles = n;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_CYCLE_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                config.cycle_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_MODEL_POOL") {
            let pool: Vec<String> = v
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !pool.is_empty() {
                config.model_pool = pool;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_DECAY_RATE") {
            if let Ok(n) = v.parse() {
                config.decay_rate = n;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_SIMILARITY_THRESHOLD") {
            if let Ok(n) = v.parse() {
                config.similarity_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_PERTURBATION_PROBABILITY") {
            if let Ok(n) = v.parse() {
                config.perturbation_probability = n;
            }
        }
        if let Ok(v) = std::env::var("CRUCIBLE_COST_LIMIT_USD") {
            if let Ok(n) = v.parse() {
                config.cost_limit_usd = Some(n);
            }
        }
        config
    }

    /// Per-agent call deadline for a roster of `agents` agents: the cycle
    /// budget split evenly, floored at `agent_call_floor_ms`.
    pub fn agent_deadline_ms(&self, agents: usize) -> u64 {
        let share = self.cycle_timeout_ms / agents.max(1) as u64;
        share.max(self.agent_call_floor_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = SessionConfig::default();
        assert_eq!(config.max_cycles, 50);
        assert_eq!(config.cycle_timeout_ms, 300_000);
        assert_eq!(config.decay_rate, 0.02);
        assert_eq!(config.similarity_threshold, 0.95);
        assert_eq!(config.perturbation_probability, 0.20);
        assert_eq!(config.summarizer_debounce_cycles, 0);
        assert!(config.cost_limit_usd.is_none());
    }

    #[test]
    fn agent_deadline_floors_at_thirty_seconds() {
        let config = SessionConfig::default();
        // 300s / 3 agents = 100s per call
        assert_eq!(config.agent_deadline_ms(3), 100_000);
        // 300s / 11 agents = 27.2s, floored to 30s
        assert_eq!(config.agent_deadline_ms(11), 30_000);
        // zero agents must not divide by zero
        assert_eq!(config.agent_deadline_ms(0), 300_000);
    }
}
