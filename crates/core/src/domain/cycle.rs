use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{
    ActResult, CheckResult, CycleStage, DoResult, PdcaPhase, PdcaStatus, PhaseResult, PlanResult,
    TeamComposition,
};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    CycleStarted,
    PhaseStarted,
    PhaseCompleted,
    PhaseFailed,
    PhaseRetrying,
    CycleCompleted,
    CycleFailed,
    CycleAborted,
    CycleResumed,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleStarted => "cycle_started",
            Self::PhaseStarted => "phase_started",
            Self::PhaseCompleted => "phase_completed",
            Self::PhaseFailed => "phase_failed",
            Self::PhaseRetrying => "phase_retrying",
            Self::CycleCompleted => "cycle_completed",
            Self::CycleFailed => "cycle_failed",
            Self::CycleAborted => "cycle_aborted",
            Self::CycleResumed => "cycle_resumed",
        }
    }
}

/// One audit record in a cycle's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub kind: TransitionKind,
    pub phase: Option<PdcaPhase>,
    /// Cycle status right after the transition.
    pub status: PdcaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SchemaValidation,
    Collaborator,
    PrerequisiteMissing,
    RetryExhausted,
    AbortedByUser,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaValidation => "schema_validation",
            Self::Collaborator => "collaborator",
            Self::PrerequisiteMissing => "prerequisite_missing",
            Self::RetryExhausted => "retry_exhausted",
            Self::AbortedByUser => "aborted_by_user",
            Self::Internal => "internal",
        }
    }
}

/// The error that ended a cycle, kept inside the terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleFailure {
    pub kind: FailureKind,
    pub phase: Option<PdcaPhase>,
    pub message: String,
    #[serde(default)]
    pub attempts: u32,
    /// Error behind a `RetryExhausted` failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureKind>,
}

impl CycleFailure {
    pub fn new(kind: FailureKind, phase: Option<PdcaPhase>, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
            attempts: 0,
            cause: None,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_cause(mut self, cause: FailureKind) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// Aggregate state of one PDCA cycle.
///
/// All mutators refuse to act once the status is terminal, and phase
/// results can only be applied once each, in `Plan, Do, Check, Act` order.
/// Lifecycle fields are private so that order holds for every caller;
/// read them through the accessors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleState {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    status: PdcaStatus,
    current_phase: PdcaPhase,
    inputs: BTreeMap<String, String>,
    plan: Option<PlanResult>,
    #[serde(rename = "do")]
    do_result: Option<DoResult>,
    check: Option<CheckResult>,
    act: Option<ActResult>,
    team: TeamComposition,
    history: Vec<HistoryEntry>,
    failure: Option<CycleFailure>,
    pub previous_cycle_id: Option<Uuid>,
    restarted_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl CycleState {
    pub fn new(inputs: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        let mut inputs = inputs;
        if !inputs.contains_key("problem_definition") {
            if let Some(problem) = inputs.get("problem").cloned() {
                inputs.insert("problem_definition".to_string(), problem);
            }
        }

        Self {
            id: Uuid::new_v4(),
            name: "PDCA cycle".to_string(),
            description: String::new(),
            status: PdcaStatus::default(),
            current_phase: PdcaPhase::Plan,
            inputs,
            plan: None,
            do_result: None,
            check: None,
            act: None,
            team: TeamComposition::default(),
            history: Vec::new(),
            failure: None,
            previous_cycle_id: None,
            restarted_from: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
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

    pub fn with_team(mut self, team: TeamComposition) -> Self {
        self.team = team;
        self
    }

    pub fn with_previous_cycle(mut self, previous: Uuid) -> Self {
        self.previous_cycle_id = Some(previous);
        self
    }

    pub fn status(&self) -> PdcaStatus {
        self.status
    }

    /// Phase in flight, or the last one entered.
    pub fn current_phase(&self) -> PdcaPhase {
        self.current_phase
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    pub fn input(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).map(String::as_str)
    }

    pub fn team(&self) -> &TeamComposition {
        &self.team
    }

    pub fn plan(&self) -> Option<&PlanResult> {
        self.plan.as_ref()
    }

    pub fn do_result(&self) -> Option<&DoResult> {
        self.do_result.as_ref()
    }

    pub fn check(&self) -> Option<&CheckResult> {
        self.check.as_ref()
    }

    pub fn act(&self) -> Option<&ActResult> {
        self.act.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn failure(&self) -> Option<&CycleFailure> {
        self.failure.as_ref()
    }

    /// Cycle this one was restarted from.
    pub fn restarted_from(&self) -> Option<Uuid> {
        self.restarted_from
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn stage(&self) -> CycleStage {
        match self.status {
            PdcaStatus::Pending => CycleStage::Pending,
            PdcaStatus::InProgress => CycleStage::from_phase(self.current_phase),
            PdcaStatus::Completed => CycleStage::Completed,
            PdcaStatus::Failed => CycleStage::Failed,
            PdcaStatus::Aborted => CycleStage::Aborted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_result(&self, phase: PdcaPhase) -> bool {
        match phase {
            PdcaPhase::Plan => self.plan.is_some(),
            PdcaPhase::Do => self.do_result.is_some(),
            PdcaPhase::Check => self.check.is_some(),
            PdcaPhase::Act => self.act.is_some(),
        }
    }

    pub fn completed_phases(&self) -> Vec<PdcaPhase> {
        PdcaPhase::ALL
            .into_iter()
            .filter(|p| self.has_result(*p))
            .collect()
    }

    pub fn last_completed_phase(&self) -> Option<PdcaPhase> {
        self.completed_phases().last().copied()
    }

    /// First phase without a result, i.e. where execution continues.
    pub fn next_phase(&self) -> Option<PdcaPhase> {
        PdcaPhase::ALL.into_iter().find(|p| !self.has_result(*p))
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn check_prerequisites(&self, phase: PdcaPhase) -> Result<()> {
        match phase
            .prerequisites()
            .iter()
            .find(|required| !self.has_result(**required))
        {
            Some(missing) => Err(CoreError::PrerequisiteMissing {
                phase,
                missing: *missing,
            }),
            None => Ok(()),
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_terminal() {
            Err(CoreError::CycleFinalized(self.id))
        } else {
            Ok(())
        }
    }

    fn ensure_running(&self, to: &str) -> Result<()> {
        self.ensure_mutable()?;
        if self.status != PdcaStatus::InProgress {
            return Err(CoreError::InvalidStatusTransition {
                from: self.status.as_str().to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Append an audit record. Terminal cycles refuse further records.
    pub fn record(
        &mut self,
        kind: TransitionKind,
        phase: Option<PdcaPhase>,
        attempt: Option<u32>,
        detail: Option<String>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.push_history(kind, phase, attempt, detail);
        Ok(())
    }

    fn push_history(
        &mut self,
        kind: TransitionKind,
        phase: Option<PdcaPhase>,
        attempt: Option<u32>,
        detail: Option<String>,
    ) {
        let now = Utc::now();
        self.history.push(HistoryEntry {
            kind,
            phase,
            status: self.status,
            attempt,
            detail,
            timestamp: now,
        });
        self.updated_at = now;
    }

    pub fn start(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        if self.status != PdcaStatus::Pending {
            return Err(CoreError::InvalidStatusTransition {
                from: self.status.as_str().to_string(),
                to: PdcaStatus::InProgress.as_str().to_string(),
            });
        }
        self.status = PdcaStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.push_history(TransitionKind::CycleStarted, None, None, None);
        Ok(())
    }

    /// Continue a persisted, non-terminal cycle.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        if self.status == PdcaStatus::Pending {
            return self.start();
        }
        let detail = self
            .next_phase()
            .map(|p| format!("continuing at {}", p));
        self.push_history(TransitionKind::CycleResumed, None, None, detail);
        Ok(())
    }

    pub fn begin_phase(&mut self, phase: PdcaPhase, attempt: u32) -> Result<()> {
        self.ensure_running(phase.as_str())?;
        if self.has_result(phase) {
            return Err(CoreError::AlreadyApplied(phase));
        }
        self.check_prerequisites(phase)?;
        self.current_phase = phase;
        self.push_history(TransitionKind::PhaseStarted, Some(phase), Some(attempt), None);
        Ok(())
    }

    /// Validate and store a phase result.
    pub fn apply_result(&mut self, result: PhaseResult) -> Result<()> {
        let phase = result.phase();
        self.ensure_running(phase.as_str())?;
        if self.has_result(phase) {
            return Err(CoreError::AlreadyApplied(phase));
        }
        self.check_prerequisites(phase)?;
        if self.current_phase != phase {
            return Err(CoreError::OutOfOrder {
                expected: self.current_phase,
                got: phase,
            });
        }

        match result {
            PhaseResult::Plan(plan) => {
                plan.validate()?;
                self.plan = Some(plan);
            }
            PhaseResult::Do(do_result) => {
                if let Some(plan) = &self.plan {
                    do_result.validate(plan)?;
                }
                self.do_result = Some(do_result);
            }
            PhaseResult::Check(check) => {
                if let Some(plan) = &self.plan {
                    check.validate(plan)?;
                }
                self.check = Some(check);
            }
            PhaseResult::Act(act) => {
                act.validate()?;
                self.act = Some(act);
            }
        }

        self.push_history(TransitionKind::PhaseCompleted, Some(phase), None, None);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.ensure_running(PdcaStatus::Completed.as_str())?;
        if let Some(missing) = self.next_phase() {
            return Err(CoreError::PrerequisiteMissing {
                phase: PdcaPhase::Act,
                missing,
            });
        }
        self.status = PdcaStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.push_history(TransitionKind::CycleCompleted, None, None, None);
        Ok(())
    }

    pub fn fail(&mut self, failure: CycleFailure) -> Result<()> {
        self.ensure_mutable()?;
        self.status = PdcaStatus::Failed;
        self.completed_at = Some(Utc::now());
        let phase = failure.phase;
        let detail = Some(format!("{}: {}", failure.kind.as_str(), failure.message));
        self.failure = Some(failure);
        self.push_history(TransitionKind::CycleFailed, phase, None, detail);
        Ok(())
    }

    /// Abort the cycle. `current_phase` stays where it is: the in-flight
    /// phase when aborted mid-phase, the last completed one at a boundary.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        let reason = reason.into();
        let last_completed = self.last_completed_phase();
        let phase = if self.status == PdcaStatus::Pending {
            None
        } else {
            Some(self.current_phase)
        };

        self.status = PdcaStatus::Aborted;
        self.completed_at = Some(Utc::now());
        self.failure = Some(CycleFailure::new(
            FailureKind::AbortedByUser,
            phase,
            reason.clone(),
        ));
        let detail = match last_completed {
            Some(p) => format!("{} (last completed phase: {})", reason, p),
            None => format!("{} (no phase completed)", reason),
        };
        self.push_history(TransitionKind::CycleAborted, phase, None, Some(detail));
        Ok(())
    }

    /// Derive a fresh pending cycle that re-runs from `phase` onwards.
    ///
    /// Results of the phases before `phase` are carried over; this state is
    /// left untouched.
    pub fn restarted_from_phase(&self, phase: PdcaPhase) -> CycleState {
        let mut restarted = CycleState::new(self.inputs.clone())
            .with_name(self.name.clone())
            .with_description(self.description.clone())
            .with_team(self.team.clone());
        restarted.previous_cycle_id = self.previous_cycle_id;
        restarted.restarted_from = Some(self.id);
        restarted.current_phase = phase;

        if phase > PdcaPhase::Plan {
            restarted.plan = self.plan.clone();
        }
        if phase > PdcaPhase::Do {
            restarted.do_result = self.do_result.clone();
        }
        if phase > PdcaPhase::Check {
            restarted.check = self.check.clone();
        }
        restarted
    }
}
