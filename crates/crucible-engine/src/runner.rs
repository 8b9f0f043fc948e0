//! Cycle runner
//!
//! One pass of the per-session state machine:
//!
//! ```text
//! IDLE -> READ -> WRITE -> ARBITER -> APPLY -> PERTURB -> TRAJECTORY -> PERSIST -> EMIT -> IDLE
//! ```
//!
//! The runner owns the blackboard: every mutation happens here, inside the
//! session's single task, which keeps clamping and death/graduation
//! race-free without locks. Control signals are observed between states;
//! APPLY itself never suspends, so a contribution row and its support
//! update land as one step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crucible_core::{
    evaluate, AgentContribution, AgentResult, AgentRole, Blackboard, ClaimSummary, FrontierIdea,
    SessionConfig, StagnationTracker, Storage, SupportOutcome, TrajectoryPoint,
};

use crate::agents::{render, AgentDispatcher, DispatchOutcome, PromptContext};
use crate::detector::{AppliedContribution, ChangeDetector};
use crate::embedder::{EmbeddingFacade, EmbeddingTransport};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::llm::ChatTransport;

/// External control state, observed between FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Running,
    Paused,
    Stopped,
}

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The claim crossed the graduation threshold
    Graduated,
    /// Support decayed through the floor
    Died,
    /// `max_cycles` reached
    MaxCycles,
    /// Cost ceiling reached at the top of a cycle
    CostExceeded,
    /// External stop request
    Stopped,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Graduated => "graduated",
            StopReason::Died => "died",
            StopReason::MaxCycles => "max_cycles",
            StopReason::CostExceeded => "cost_exceeded",
            StopReason::Stopped => "stopped",
        }
    }
}

/// One cycle's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    Finished(StopReason),
}

/// Per-session runner. Owns the blackboard for the session's lifetime.
pub struct CycleRunner {
    session_id: String,
    board: Blackboard,
    config: SessionConfig,
    storage: Arc<Storage>,
    dispatcher: AgentDispatcher,
    detector: ChangeDetector,
    embedder: EmbeddingFacade,
    events: Arc<EventBus>,
    stagnation: StagnationTracker,
    /// Activated frontier idea awaiting the Perturber
    pending_perturbation: Option<FrontierIdea>,
    /// Consecutive cycles the current objection has stood unchanged
    objection_streak: u32,
    last_objection: Option<String>,
    rng: StdRng,
}

impl CycleRunner {
    pub fn new(
        board: Blackboard,
        config: SessionConfig,
        storage: Arc<Storage>,
        chat: Arc<dyn ChatTransport>,
        embedding: Arc<dyn EmbeddingTransport>,
        events: Arc<EventBus>,
    ) -> Self {
        let dispatcher = AgentDispatcher::new(chat.clone(), config.model_pool.clone());
        let detector = ChangeDetector::new(
            chat,
            config.model_pool.clone(),
            config.similarity_threshold,
        );
        Self {
            session_id: board.session_id().to_string(),
            board,
            config,
            storage,
            dispatcher,
            detector,
            embedder: EmbeddingFacade::new(embedding),
            events,
            stagnation: StagnationTracker::new(),
            pending_perturbation: None,
            objection_streak: 0,
            last_objection: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn board(&self) -> &Blackboard {
        &self.board
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The cycle's agent roster, derived from the cycle index and the
    /// conditional signals.
    fn select_roster(
        cycle: u64,
        support: f64,
        stagnating: bool,
        perturbation_pending: bool,
    ) -> Vec<AgentRole> {
        let mut roster = vec![AgentRole::Explorer, AgentRole::Critic, AgentRole::Summarizer];
        if cycle % 3 == 0 {
            roster.extend([
                AgentRole::Connector,
                AgentRole::Steelman,
                AgentRole::Operationalizer,
                AgentRole::Quantifier,
            ]);
        }
        if cycle % 5 == 0 {
            roster.extend([
                AgentRole::Reducer,
                AgentRole::BoundaryHunter,
                AgentRole::Translator,
                AgentRole::Historian,
            ]);
        }
        if support < 0.4 {
            roster.push(AgentRole::GraveKeeper);
        }
        if stagnating {
            roster.push(AgentRole::Cartographer);
        }
        if perturbation_pending {
            roster.push(AgentRole::Perturber);
        }
        roster
    }

    /// Wait out a pause; `Err` means an external stop arrived.
    async fn checkpoint(
        control: &mut watch::Receiver<Control>,
    ) -> std::result::Result<(), StopReason> {
        loop {
            let state = *control.borrow();
            match state {
                Control::Running => return Ok(()),
                Control::Stopped => return Err(StopReason::Stopped),
                Control::Paused => {
                    if control.changed().await.is_err() {
                        return Err(StopReason::Stopped);
                    }
                }
            }
        }
    }

    /// Run one full cycle. Persistence problems are logged and retried
    /// next cycle; only invariant violations propagate as errors.
    pub async fn run_cycle(
        &mut self,
        control: &mut watch::Receiver<Control>,
    ) -> Result<CycleOutcome> {
        let started = std::time::Instant::now();

        // -- cost gate, checked before any agent starts --
        if let Some(limit) = self.board.cost_limit_usd() {
            let spent = self
                .storage
                .total_cost_usd(self.board.id())
                .unwrap_or_else(|error| {
                    warn!(%error, "cost lookup failed; assuming zero");
                    0.0
                });
            if spent >= limit {
                info!(spent, limit, "cost limit reached; stopping session");
                return Ok(CycleOutcome::Finished(StopReason::CostExceeded));
            }
        }

        if self.board.current_claim().is_none() {
            // a prior cycle already ended the claim
            return Ok(CycleOutcome::Finished(self.terminal_reason()));
        }

        // -- READ --
        if Self::checkpoint(control).await.is_err() {
            return Ok(CycleOutcome::Finished(StopReason::Stopped));
        }
        let cycle = self.board.increment_cycle();
        self.events.publish_session(
            &self.session_id,
            SessionEvent::CycleStarted {
                session_id: self.session_id.clone(),
                cycle_number: cycle,
                timestamp: Utc::now(),
            },
        );
        let snapshot = self.board.get_state();
        let stagnating = self.stagnation.consume_signal();
        let roster = Self::select_roster(
            cycle,
            snapshot.support_strength,
            stagnating,
            self.pending_perturbation.is_some(),
        );
        debug!(cycle, roster = ?roster.iter().map(|r| r.as_str()).collect::<Vec<_>>(), "roster selected");

        // -- WRITE --
        if Self::checkpoint(control).await.is_err() {
            return Ok(CycleOutcome::Finished(StopReason::Stopped));
        }
        let deadline = Duration::from_millis(self.config.agent_deadline_ms(roster.len()));
        let base_context = PromptContext::from_state(&snapshot);
        let next_framework = self.board.get_next_translator_framework();
        let mut join_set: JoinSet<(usize, DispatchOutcome)> = JoinSet::new();
        for (index, role) in roster.iter().copied().enumerate() {
            let dispatcher = self.dispatcher.clone();
            let mut context = base_context.clone();
            if role == AgentRole::Translator {
                context.translator_framework = Some(next_framework.to_string());
            }
            if role == AgentRole::Perturber {
                context.perturbation_seed = self
                    .pending_perturbation
                    .as_ref()
                    .map(|idea| idea.idea_text.clone());
            }
            join_set.spawn(async move {
                match tokio::time::timeout(deadline, dispatcher.dispatch(role, &context, cycle))
                    .await
                {
                    Ok(outcome) => (index, outcome),
                    // the in-flight transport call is abandoned; a late
                    // completion is discarded with the task
                    Err(_) => (
                        index,
                        DispatchOutcome {
                            result: AgentResult::Failed {
                                role,
                                reason: EngineError::Timeout(deadline.as_millis() as u64)
                                    .to_string(),
                            },
                            input_prompt: render(role, &context)
                                .iter()
                                .map(|message| message.content.as_str())
                                .collect::<Vec<_>>()
                                .join("\n"),
                            output_text: String::new(),
                            cost: None,
                        },
                    ),
                }
            });
        }
        let mut outcomes: Vec<Option<DispatchOutcome>> =
            (0..roster.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => warn!(%error, "agent task panicked"),
            }
        }
        let outcomes: Vec<DispatchOutcome> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| DispatchOutcome {
                    result: AgentResult::Failed {
                        role: roster[index],
                        reason: "agent task aborted".into(),
                    },
                    input_prompt: String::new(),
                    output_text: String::new(),
                    cost: None,
                })
            })
            .collect();

        // -- ARBITER --
        if Self::checkpoint(control).await.is_err() {
            return Ok(CycleOutcome::Finished(StopReason::Stopped));
        }
        let results: Vec<AgentResult> = outcomes
            .iter()
            .map(|outcome| outcome.result.clone())
            .collect();
        let accepted = evaluate(&results, &snapshot);
        debug!(
            cycle,
            accepted = accepted.len(),
            invoked = roster.len(),
            "arbitration complete"
        );

        // -- APPLY --
        // synchronous throughout: no await between a contribution row and
        // its support update
        let by_role: HashMap<AgentRole, &DispatchOutcome> = outcomes
            .iter()
            .map(|outcome| (outcome.result.role(), outcome))
            .collect();
        let mut terminal: Option<StopReason> = None;

        if self.config.decay_rate > 0.0 && terminal.is_none() {
            terminal = self.apply_support_delta(-self.config.decay_rate);
        }

        let mut applied: Vec<AppliedContribution> = Vec::with_capacity(accepted.len());
        let mut summary: Option<ClaimSummary> = None;
        for (role, model, output, delta) in &accepted {
            let contribution = AgentContribution {
                id: 0,
                cycle_number: cycle,
                agent_role: *role,
                model_used: model.clone(),
                input_prompt: by_role
                    .get(role)
                    .map(|outcome| outcome.input_prompt.clone())
                    .unwrap_or_default(),
                output_text: by_role
                    .get(role)
                    .map(|outcome| outcome.output_text.clone())
                    .unwrap_or_default(),
                accepted: true,
                support_delta: *delta,
                created_at: Utc::now(),
            };
            let contribution_id = match self
                .storage
                .insert_contribution(self.board.id(), &contribution)
            {
                Ok(id) => id,
                Err(error) => {
                    warn!(%error, "contribution persist failed; continuing with in-memory state");
                    0
                }
            };
            applied.push(AppliedContribution {
                role: *role,
                contribution_id,
                support_delta: *delta,
            });

            if terminal.is_some() {
                // deltas halt after death or graduation; remaining
                // accepted rows are still persisted above
                continue;
            }
            if let Some(reason) = self.apply_support_delta(*delta) {
                terminal = Some(reason);
                continue;
            }

            // role side effects
            match role {
                AgentRole::Explorer => {
                    if let Some(new_claim) = &output.new_claim {
                        self.board.update_claim(new_claim);
                        self.events.publish_session(
                            &self.session_id,
                            SessionEvent::ClaimUpdated {
                                session_id: self.session_id.clone(),
                                text: new_claim.clone(),
                                timestamp: Utc::now(),
                            },
                        );
                    }
                }
                AgentRole::Critic => {
                    self.board.set_active_objection(output.objection.clone());
                }
                AgentRole::Connector => {
                    self.board.set_analogy(output.analogy.clone());
                }
                AgentRole::Translator => {
                    if let Some(framework) = &output.framework {
                        self.board.record_translator_framework(framework);
                    }
                }
                AgentRole::Perturber => {
                    // seed consumed; activation already happened at PERTURB
                    self.pending_perturbation = None;
                }
                AgentRole::Summarizer => {
                    summary = Some(ClaimSummary {
                        cycle_number: cycle,
                        context: output.summary.clone(),
                        evolution: output.summary.clone(),
                        addressed_objections: output.addressed_objections.clone(),
                        remaining_gaps: output.remaining_gaps.clone(),
                    });
                }
                _ => {}
            }
            for idea in &output.frontier_ideas {
                self.board.add_frontier_idea(idea, role.as_str());
            }
        }

        // rows for everything the arbiter rejected or the transport lost
        let accepted_roles: Vec<AgentRole> = accepted.iter().map(|(role, ..)| *role).collect();
        for outcome in &outcomes {
            let role = outcome.result.role();
            if accepted_roles.contains(&role) {
                continue;
            }
            let (output_text, delta) = match &outcome.result {
                AgentResult::Reply((_, _, _, delta)) => (outcome.output_text.clone(), *delta),
                AgentResult::Failed { reason, .. } => (format!("error: {}", reason), 0.0),
            };
            let contribution = AgentContribution {
                id: 0,
                cycle_number: cycle,
                agent_role: role,
                model_used: match &outcome.result {
                    AgentResult::Reply((_, model, ..)) => model.clone(),
                    AgentResult::Failed { .. } => String::new(),
                },
                input_prompt: outcome.input_prompt.clone(),
                output_text,
                accepted: false,
                support_delta: delta,
                created_at: Utc::now(),
            };
            if let Err(error) = self
                .storage
                .insert_contribution(self.board.id(), &contribution)
            {
                warn!(%error, "rejected contribution persist failed");
            }
        }

        for outcome in &outcomes {
            if let Some(cost) = &outcome.cost {
                if let Err(error) = self.storage.record_cost(self.board.id(), cost) {
                    warn!(%error, "cost row persist failed");
                }
            }
        }

        if let Some(summary) = &summary {
            let due = match self.storage.last_summary_cycle(self.board.id()) {
                Ok(Some(last)) => cycle.saturating_sub(last) >= self.config.summarizer_debounce_cycles,
                Ok(None) => true,
                Err(error) => {
                    warn!(%error, "summary debounce lookup failed");
                    true
                }
            };
            if due {
                if let Err(error) = self.storage.insert_summary(self.board.id(), summary) {
                    warn!(%error, "summary persist failed");
                }
            }
        }

        self.board.check_invariants().map_err(EngineError::from)?;

        // -- PERTURB --
        if Self::checkpoint(control).await.is_err() {
            return Ok(CycleOutcome::Finished(StopReason::Stopped));
        }
        let retired = self.board.age_frontiers();
        if !retired.is_empty() {
            debug!(count = retired.len(), "frontier ideas retired");
        }
        let objection = self.board.active_objection().map(str::to_string);
        if objection.is_some() && objection == self.last_objection {
            self.objection_streak += 1;
        } else {
            self.objection_streak = u32::from(objection.is_some());
        }
        self.last_objection = objection;
        let forced = self.objection_streak >= 3;
        if forced {
            self.objection_streak = 0;
        }
        let perturbation_probability = self.config.perturbation_probability.clamp(0.0, 1.0);
        if terminal.is_none() && (forced || self.rng.gen_bool(perturbation_probability)) {
            if let Some(idea) = self.board.select_weighted_frontier(&mut self.rng) {
                match self.board.activate_frontier(&idea.id) {
                    Ok(activated) => {
                        info!(idea = %activated.idea_text, forced, "frontier idea activated");
                        self.pending_perturbation = Some(activated);
                    }
                    Err(error) => warn!(%error, "frontier activation failed"),
                }
            }
        }

        // -- TRAJECTORY --
        if Self::checkpoint(control).await.is_err() {
            return Ok(CycleOutcome::Finished(StopReason::Stopped));
        }
        if let Some(claim) = self.board.current_claim().map(str::to_string) {
            match self.embedder.embed(&claim).await {
                Ok(vector) => {
                    self.board.set_embedding(Some(vector.clone()));
                    let point = TrajectoryPoint {
                        cycle_number: cycle,
                        embedding: vector,
                        claim_text: claim,
                        support_strength: self.board.support_strength(),
                        recorded_at: Utc::now(),
                    };
                    let previous = self
                        .storage
                        .previous_trajectory_point(self.board.id(), cycle)
                        .unwrap_or_else(|error| {
                            warn!(%error, "previous point lookup failed");
                            None
                        });
                    if let Err(error) =
                        self.storage.insert_trajectory_point(self.board.id(), &point)
                    {
                        warn!(%error, "trajectory point persist failed");
                    }
                    if let Some(previous) = previous {
                        match self.detector.detect(&previous, &point, &applied).await {
                            Some(transition) => {
                                if let Err(error) =
                                    self.storage.insert_transition(self.board.id(), &transition)
                                {
                                    warn!(%error, "transition persist failed");
                                }
                                self.stagnation.observe(true);
                            }
                            None => self.stagnation.observe(false),
                        }
                    }
                }
                Err(error) => warn!(%error, "claim embedding failed; skipping trajectory point"),
            }
        }

        // -- PERSIST --
        // failures leave the in-memory board authoritative; the next
        // cycle's persist carries the latest state anyway
        if let Err(error) = self.storage.persist_blackboard(&self.board) {
            warn!(%error, "blackboard persist failed; will retry next cycle");
        } else if let Err(error) = self.storage.create_snapshot(&self.board) {
            warn!(%error, "snapshot persist failed; will retry next cycle");
        }

        // -- EMIT --
        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.publish_session(
            &self.session_id,
            SessionEvent::CycleComplete {
                session_id: self.session_id.clone(),
                cycle_number: cycle,
                duration_ms,
                support_strength: self.board.support_strength(),
                current_claim: self.board.current_claim().map(str::to_string),
                timestamp: Utc::now(),
            },
        );
        self.events.publish_session(
            &self.session_id,
            SessionEvent::BlackboardUpdated {
                session_id: self.session_id.clone(),
                state: Box::new(self.board.get_state()),
                timestamp: Utc::now(),
            },
        );

        if let Some(reason) = terminal {
            return Ok(CycleOutcome::Finished(reason));
        }
        if cycle >= self.config.max_cycles {
            info!(cycle, "max cycles reached");
            return Ok(CycleOutcome::Finished(StopReason::MaxCycles));
        }
        Ok(CycleOutcome::Continue)
    }

    /// Apply one delta and emit the matching events. Returns the stop
    /// reason when the update ended the claim.
    fn apply_support_delta(&mut self, delta: f64) -> Option<StopReason> {
        let outcome = self.board.update_support(delta);
        self.events.publish_session(
            &self.session_id,
            SessionEvent::SupportUpdated {
                session_id: self.session_id.clone(),
                support_strength: self.board.support_strength(),
                timestamp: Utc::now(),
            },
        );
        match outcome {
            SupportOutcome::Applied { .. } => None,
            SupportOutcome::Graduated { entry, .. } => {
                info!(claim = %entry.claim, "claim graduated");
                self.events.publish_session(
                    &self.session_id,
                    SessionEvent::ClaimGraduated {
                        session_id: self.session_id.clone(),
                        entry,
                        timestamp: Utc::now(),
                    },
                );
                Some(StopReason::Graduated)
            }
            SupportOutcome::Died { entry, .. } => {
                info!(claim = %entry.claim, cause = %entry.cause_of_death, "claim died");
                self.events.publish_session(
                    &self.session_id,
                    SessionEvent::ClaimDied {
                        session_id: self.session_id.clone(),
                        entry,
                        timestamp: Utc::now(),
                    },
                );
                Some(StopReason::Died)
            }
        }
    }

    /// Reconstruct how an already-ended claim ended.
    fn terminal_reason(&self) -> StopReason {
        let graduated = self
            .board
            .graduated_claims()
            .last()
            .map(|entry| entry.cycle_graduated);
        let died = self.board.cemetery().first().map(|entry| entry.cycle_killed);
        match (graduated, died) {
            (Some(g), Some(d)) if g >= d => StopReason::Graduated,
            (Some(_), None) => StopReason::Graduated,
            _ => StopReason::Died,
        }
    }
}
