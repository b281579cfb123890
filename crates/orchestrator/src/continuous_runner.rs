//! Sequential multi-cycle runs where each cycle learns from the ones before.
//!
//! Cycle `i + 1` is only created once cycle `i` is terminal, because its
//! seed inputs are derived from that terminal state.

use events::{Event, EventBus};
use pdca_core::{CycleState, PdcaPhase, PdcaStatus, TeamComposition};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::composer::{StaticComposer, TeamComposer};
use crate::config::{ContinuousConfig, LessonsMerge};
use crate::cycle_orchestrator::CycleOrchestrator;
use crate::error::Result;
use crate::report::CycleSummary;

pub const PREVIOUS_CYCLE_ID: &str = "previous_cycle_id";
pub const PREVIOUS_RECOMMENDATIONS: &str = "previous_recommendations";
pub const PRIOR_LESSONS: &str = "prior_lessons";
pub const PREVIOUS_CYCLE_OUTCOME: &str = "previous_cycle_outcome";

const DEFAULT_RUN_NAME: &str = "PDCA cycle";

pub struct ContinuousRunner {
    orchestrator: CycleOrchestrator,
    config: ContinuousConfig,
    composer: Arc<dyn TeamComposer>,
    event_bus: Option<EventBus>,
    name: String,
    description: String,
    team: TeamComposition,
}

impl ContinuousRunner {
    pub fn new(orchestrator: CycleOrchestrator, config: ContinuousConfig) -> Self {
        Self {
            orchestrator,
            config,
            composer: Arc::new(StaticComposer),
            event_bus: None,
            name: DEFAULT_RUN_NAME.to_string(),
            description: String::new(),
            team: TeamComposition::default(),
        }
    }

    pub fn with_composer(mut self, composer: Arc<dyn TeamComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Team used by the first cycle.
    pub fn with_team(mut self, team: TeamComposition) -> Self {
        self.team = team;
        self
    }

    pub fn orchestrator(&self) -> &CycleOrchestrator {
        &self.orchestrator
    }

    /// Run up to `num_cycles` cycles and return every cycle produced,
    /// oldest first.
    ///
    /// The run ends early when a cycle is aborted, or when one fails and
    /// `continue_on_failure` is off. The cycle that ended the run is part
    /// of the result.
    pub async fn run(
        &self,
        initial_inputs: BTreeMap<String, String>,
        num_cycles: usize,
    ) -> Result<Vec<CycleState>> {
        let mut cycles: Vec<CycleState> = Vec::with_capacity(num_cycles);
        let mut team = self.team.clone();

        info!(
            name = %self.name,
            num_cycles,
            continue_on_failure = self.config.continue_on_failure,
            "Continuous run started"
        );

        for index in 1..=num_cycles {
            if index > 1 {
                team = self.recompose(index, &team, &cycles).await;
            }

            let inputs = seed_inputs(&initial_inputs, &cycles, self.config.lessons_merge);
            let mut state = CycleState::new(inputs)
                .with_name(self.cycle_name(index))
                .with_description(self.description.clone())
                .with_team(team.clone());
            if let Some(previous) = cycles.last() {
                state = state.with_previous_cycle(previous.id);
            }

            info!(cycle_index = index, cycle_id = %state.id, "Running cycle");
            let state = self.orchestrator.run(state).await?;
            let status = state.status();
            let cycle_id = state.id;
            cycles.push(state);

            let stop_reason = match status {
                PdcaStatus::Completed => None,
                PdcaStatus::Aborted => Some(format!("cycle {} aborted", cycle_id)),
                PdcaStatus::Failed if self.config.continue_on_failure => {
                    warn!(
                        cycle_index = index,
                        cycle_id = %cycle_id,
                        "Cycle failed, continuing with next cycle"
                    );
                    None
                }
                PdcaStatus::Failed => Some(format!("cycle {} failed", cycle_id)),
                PdcaStatus::Pending | PdcaStatus::InProgress => {
                    Some(format!("cycle {} did not finish", cycle_id))
                }
            };

            if let Some(reason) = stop_reason {
                if index < num_cycles {
                    warn!(cycles_run = cycles.len(), reason = %reason, "Continuous run stopped");
                    self.emit_event(Event::RunStopped {
                        cycles_run: cycles.len(),
                        reason,
                    });
                }
                break;
            }
        }

        info!(
            cycles_run = cycles.len(),
            completed = cycles
                .iter()
                .filter(|c| c.status() == PdcaStatus::Completed)
                .count(),
            "Continuous run finished"
        );
        Ok(cycles)
    }

    /// Continuations are numbered from 1, so cycle 2 is continuation #1.
    fn cycle_name(&self, index: usize) -> String {
        match index.saturating_sub(1) {
            0 => self.name.clone(),
            continuation => format!("{} - continuation #{}", self.name, continuation),
        }
    }

    /// Ask the composer for the next team, keeping the current one when it
    /// errors or drops every agent of a phase.
    async fn recompose(
        &self,
        index: usize,
        current: &TeamComposition,
        cycles: &[CycleState],
    ) -> TeamComposition {
        let summaries: Vec<CycleSummary> = cycles.iter().map(CycleSummary::from).collect();

        let next = match self.composer.compose(index, current, &summaries).await {
            Ok(next) => next,
            Err(e) => {
                warn!(cycle_index = index, error = %e, "Team composer failed, keeping previous team");
                return current.clone();
            }
        };

        if let Some(phase) = PdcaPhase::ALL.into_iter().find(|p| {
            !current.for_phase(*p).is_empty() && next.for_phase(*p).is_empty()
        }) {
            warn!(
                cycle_index = index,
                phase = %phase,
                "Composed team has no agents for phase, keeping previous team"
            );
            return current.clone();
        }

        if next != *current {
            info!(
                cycle_index = index,
                revision = next.revision,
                agent_count = next.agent_count(),
                "Team recomposed"
            );
            self.emit_event(Event::TeamRecomposed {
                cycle_index: index,
                revision: next.revision,
                agent_count: next.agent_count(),
            });
        }
        next
    }

    fn emit_event(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event);
        }
    }
}

/// Inputs for the next cycle: the run's initial inputs plus whatever the
/// earlier cycles left behind.
pub fn seed_inputs(
    initial: &BTreeMap<String, String>,
    prior: &[CycleState],
    merge: LessonsMerge,
) -> BTreeMap<String, String> {
    let mut inputs = initial.clone();
    let Some(previous) = prior.last() else {
        return inputs;
    };

    inputs.insert(PREVIOUS_CYCLE_ID.to_string(), previous.id.to_string());

    if let Some(act) = previous.act() {
        if !act.next_cycle_recommendations.trim().is_empty() {
            inputs.insert(
                PREVIOUS_RECOMMENDATIONS.to_string(),
                act.next_cycle_recommendations.clone(),
            );
        }
    }

    let lessons = merge.merge(
        prior
            .iter()
            .filter_map(|c| c.act())
            .flat_map(|act| act.lessons_learned.iter().map(String::as_str)),
    );
    if !lessons.is_empty() {
        inputs.insert(PRIOR_LESSONS.to_string(), lessons.join("\n"));
    }

    if previous.status() != PdcaStatus::Completed {
        inputs.insert(PREVIOUS_CYCLE_OUTCOME.to_string(), outcome(previous));
    }
    inputs
}

fn outcome(state: &CycleState) -> String {
    let phase = state
        .failure()
        .and_then(|f| f.phase)
        .unwrap_or(state.current_phase());
    let message = state
        .failure()
        .map(|f| f.message.as_str())
        .unwrap_or("no failure recorded");
    format!(
        "cycle {} {} during {}: {}",
        state.id, state.status(), phase, message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{DeviationSpecialistComposer, SPECIALIST_NAME};
    use crate::config::OrchestratorConfig;
    use crate::error::OrchestratorError;
    use crate::fixtures::{self, FixtureExecutor};
    use async_trait::async_trait;
    use pdca_core::{CycleFailure, FailureKind};

    fn completed() -> CycleState {
        let mut state = fixtures::state_after(PdcaPhase::Act);
        state.complete().unwrap();
        state
    }

    fn runner() -> ContinuousRunner {
        let orchestrator =
            CycleOrchestrator::new(Arc::new(FixtureExecutor), OrchestratorConfig::new());
        ContinuousRunner::new(orchestrator, ContinuousConfig::new()).with_name("Cement")
    }

    struct BrokenComposer;

    #[async_trait]
    impl TeamComposer for BrokenComposer {
        async fn compose(
            &self,
            _cycle_index: usize,
            _previous: &TeamComposition,
            _prior: &[CycleSummary],
        ) -> Result<TeamComposition> {
            Err(OrchestratorError::NotFound("team catalogue".to_string()))
        }
    }

    #[test]
    fn test_first_cycle_uses_initial_inputs() {
        let initial = fixtures::inputs();
        assert_eq!(seed_inputs(&initial, &[], LessonsMerge::Concatenate), initial);
    }

    #[test]
    fn test_seed_from_completed_cycles() {
        let first = completed();
        let second = completed();
        let seeded = seed_inputs(
            &fixtures::inputs(),
            &[first, second.clone()],
            LessonsMerge::Concatenate,
        );

        assert_eq!(seeded.get("problem").map(String::as_str), Some("Cement strength below target"));
        assert_eq!(seeded.get(PREVIOUS_CYCLE_ID), Some(&second.id.to_string()));
        assert_eq!(
            seeded.get(PREVIOUS_RECOMMENDATIONS).map(String::as_str),
            Some("Focus on supplier quality")
        );
        assert_eq!(
            seeded.get(PRIOR_LESSONS).map(String::as_str),
            Some(
                "Curing time drives strength\nAudit suppliers early\n\
                 Curing time drives strength\nAudit suppliers early"
            )
        );
        assert!(!seeded.contains_key(PREVIOUS_CYCLE_OUTCOME));

        let deduped = seed_inputs(
            &fixtures::inputs(),
            &[completed(), completed()],
            LessonsMerge::Deduplicate,
        );
        assert_eq!(
            deduped.get(PRIOR_LESSONS).map(String::as_str),
            Some("Curing time drives strength\nAudit suppliers early")
        );
    }

    #[test]
    fn test_seed_notes_failed_predecessor() {
        let mut failed = fixtures::state_after(PdcaPhase::Plan);
        failed
            .fail(CycleFailure::new(
                FailureKind::Collaborator,
                Some(PdcaPhase::Do),
                "engine down",
            ))
            .unwrap();

        let seeded = seed_inputs(
            &fixtures::inputs(),
            &[completed(), failed.clone()],
            LessonsMerge::Concatenate,
        );
        assert_eq!(
            seeded.get(PREVIOUS_CYCLE_OUTCOME),
            Some(&format!("cycle {} failed during do: engine down", failed.id))
        );
        assert!(!seeded.contains_key(PREVIOUS_RECOMMENDATIONS));
        assert_eq!(
            seeded.get(PRIOR_LESSONS).map(String::as_str),
            Some("Curing time drives strength\nAudit suppliers early")
        );
    }

    #[tokio::test]
    async fn test_run_links_and_names_cycles() {
        let cycles = runner().run(fixtures::inputs(), 3).await.unwrap();

        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].name, "Cement");
        assert_eq!(cycles[1].name, "Cement - continuation #1");
        assert_eq!(cycles[2].name, "Cement - continuation #2");
        assert_eq!(cycles[0].previous_cycle_id, None);
        assert_eq!(cycles[1].previous_cycle_id, Some(cycles[0].id));
        assert_eq!(cycles[2].previous_cycle_id, Some(cycles[1].id));
        assert!(cycles.iter().all(|c| c.status() == PdcaStatus::Completed));
    }

    #[tokio::test]
    async fn test_zero_cycles() {
        assert!(runner().run(fixtures::inputs(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_composer_changes_team() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let cycles = runner()
            .with_composer(Arc::new(DeviationSpecialistComposer::new()))
            .with_event_bus(bus)
            .run(fixtures::inputs(), 2)
            .await
            .unwrap();

        assert!(!cycles[0].team().has_agent(PdcaPhase::Plan, SPECIALIST_NAME));
        assert!(cycles[1].team().has_agent(PdcaPhase::Plan, SPECIALIST_NAME));
        assert_eq!(cycles[1].team().revision, cycles[0].team().revision + 1);

        let envelope = rx.try_recv().unwrap();
        assert!(matches!(
            envelope.event,
            Event::TeamRecomposed { cycle_index: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_composer_failure_keeps_team() {
        let cycles = runner()
            .with_composer(Arc::new(BrokenComposer))
            .run(fixtures::inputs(), 2)
            .await
            .unwrap();

        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[1].team(), cycles[0].team());
    }

    #[tokio::test]
    async fn test_abort_stops_run() {
        let runner = runner();
        runner.orchestrator().abort_handle().abort("shutdown");

        let cycles = runner.run(fixtures::inputs(), 3).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].status(), PdcaStatus::Aborted);
    }
}
