//! Policies deciding which agents work the next cycle of a continuous run.
//!
//! A composer only returns data: a new [`TeamComposition`]. It never
//! creates executors itself.

use async_trait::async_trait;
use pdca_core::{AgentProfile, PdcaPhase, TeamComposition};
use tracing::debug;

use crate::error::Result;
use crate::report::CycleSummary;

pub const SPECIALIST_NAME: &str = "problem_resolution_specialist";

#[async_trait]
pub trait TeamComposer: Send + Sync {
    /// Team for cycle `cycle_index` (1-based). `prior` holds every earlier
    /// cycle of the run, oldest first.
    async fn compose(
        &self,
        cycle_index: usize,
        previous: &TeamComposition,
        prior: &[CycleSummary],
    ) -> Result<TeamComposition>;
}

/// Keeps the previous team unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticComposer;

#[async_trait]
impl TeamComposer for StaticComposer {
    async fn compose(
        &self,
        _cycle_index: usize,
        previous: &TeamComposition,
        _prior: &[CycleSummary],
    ) -> Result<TeamComposition> {
        Ok(previous.clone())
    }
}

/// Brings in a problem-resolution specialist for Plan and Act once the last
/// cycle's Check phase found deviations.
#[derive(Debug, Clone, Default)]
pub struct DeviationSpecialistComposer {
    specialist: Option<AgentProfile>,
}

impl DeviationSpecialistComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_specialist(mut self, specialist: AgentProfile) -> Self {
        self.specialist = Some(specialist);
        self
    }

    fn specialist(&self) -> AgentProfile {
        self.specialist.clone().unwrap_or_else(|| {
            AgentProfile::new(
                SPECIALIST_NAME,
                "Problem resolution specialist",
                "Resolve the deviations found in the previous cycle",
            )
            .with_backstory("Brought in after a cycle that missed its targets")
            .with_tools(["root cause analysis", "corrective action planning"])
        })
    }
}

#[async_trait]
impl TeamComposer for DeviationSpecialistComposer {
    async fn compose(
        &self,
        cycle_index: usize,
        previous: &TeamComposition,
        prior: &[CycleSummary],
    ) -> Result<TeamComposition> {
        let deviations = prior.last().map_or(0, |s| s.deviation_count);
        if deviations == 0 {
            return Ok(previous.clone());
        }

        let mut team = previous.clone();
        let specialist = self.specialist();
        let added_plan = team.add_agent(PdcaPhase::Plan, specialist.clone());
        let added_act = team.add_agent(PdcaPhase::Act, specialist);
        if added_plan || added_act {
            team.revision = previous.revision + 1;
            debug!(
                cycle_index,
                deviations,
                revision = team.revision,
                "Added problem resolution specialist"
            );
        }
        Ok(team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn summary_after_check() -> CycleSummary {
        CycleSummary::from(&fixtures::state_after(PdcaPhase::Check))
    }

    #[tokio::test]
    async fn test_static_keeps_team() {
        let team = TeamComposition::default();
        let next = StaticComposer
            .compose(2, &team, &[summary_after_check()])
            .await
            .unwrap();
        assert_eq!(next, team);
    }

    #[tokio::test]
    async fn test_specialist_added_after_deviations() {
        let team = TeamComposition::default();
        let next = DeviationSpecialistComposer::new()
            .compose(2, &team, &[summary_after_check()])
            .await
            .unwrap();

        assert_eq!(next.revision, team.revision + 1);
        assert!(next.has_agent(PdcaPhase::Plan, SPECIALIST_NAME));
        assert!(next.has_agent(PdcaPhase::Act, SPECIALIST_NAME));
        assert!(!next.has_agent(PdcaPhase::Do, SPECIALIST_NAME));
        assert_eq!(next.agent_count(), team.agent_count() + 2);
    }

    #[tokio::test]
    async fn test_specialist_added_once() {
        let composer = DeviationSpecialistComposer::new();
        let prior = [summary_after_check()];
        let once = composer
            .compose(2, &TeamComposition::default(), &prior)
            .await
            .unwrap();
        let twice = composer.compose(3, &once, &prior).await.unwrap();
        assert_eq!(twice, once);
    }

    #[tokio::test]
    async fn test_no_deviations_no_change() {
        let team = TeamComposition::default();
        let prior = [CycleSummary::from(&fixtures::state_after(PdcaPhase::Do))];
        let next = DeviationSpecialistComposer::new()
            .compose(2, &team, &prior)
            .await
            .unwrap();
        assert_eq!(next, team);

        let first = DeviationSpecialistComposer::new()
            .compose(1, &team, &[])
            .await
            .unwrap();
        assert_eq!(first, team);
    }
}
