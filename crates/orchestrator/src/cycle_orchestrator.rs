//! Drives one cycle through Plan, Do, Check and Act.
//!
//! The orchestrator is the only component that mutates a [`CycleState`].
//! Every transition is appended to the state's history, saved to the
//! optional [`CycleStore`] and published on the optional [`EventBus`].
//! Executor failures are retried per [`RetryPolicy`](crate::RetryPolicy)
//! and otherwise end the cycle as `Failed`; the caller always gets the
//! final state back.

use events::{Event, EventBus};
use pdca_core::{
    CycleFailure, CycleStage, CycleState, FailureKind, PdcaPhase, PhaseResult, TransitionKind,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::abort::AbortHandle;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::PhaseExecutor;
use crate::state_machine::CycleStateMachine;
use crate::store::CycleStore;

/// How a single phase ended.
enum PhaseOutcome {
    Completed,
    Failed,
    Aborted,
}

pub struct CycleOrchestrator {
    executor: Arc<dyn PhaseExecutor>,
    config: OrchestratorConfig,
    store: Option<Arc<dyn CycleStore>>,
    event_bus: Option<EventBus>,
    abort: AbortHandle,
}

impl CycleOrchestrator {
    pub fn new(executor: Arc<dyn PhaseExecutor>, config: OrchestratorConfig) -> Self {
        Self {
            executor,
            config,
            store: None,
            event_bus: None,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CycleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a pending cycle to a terminal status.
    pub async fn run(&self, mut state: CycleState) -> Result<CycleState> {
        if state.status() != pdca_core::PdcaStatus::Pending {
            return Err(OrchestratorError::InvalidTransition {
                from: state.status().as_str().to_string(),
                to: "in_progress".to_string(),
            });
        }

        if self.abort.is_aborted() {
            self.abort_cycle(&mut state).await;
            return Ok(state);
        }

        let first = state.next_phase().unwrap_or(PdcaPhase::Act);
        CycleStateMachine::validate_transition(&state.stage(), &CycleStage::from_phase(first))?;

        state.start()?;
        info!(
            cycle_id = %state.id,
            name = %state.name,
            first_phase = %first,
            "Cycle started"
        );
        self.emit_event(Event::CycleStarted {
            cycle_id: state.id,
            name: state.name.clone(),
        });
        self.persist(&state).await;

        self.drive(&mut state).await;
        Ok(state)
    }

    /// Continue a persisted cycle from its first missing phase.
    ///
    /// Terminal cycles are returned unchanged.
    pub async fn resume(&self, mut state: CycleState) -> Result<CycleState> {
        if state.is_terminal() {
            debug!(cycle_id = %state.id, status = %state.status(), "Cycle already finished");
            return Ok(state);
        }
        if state.status() == pdca_core::PdcaStatus::Pending {
            return self.run(state).await;
        }

        state.resume()?;
        let next_phase = state.next_phase();
        info!(
            cycle_id = %state.id,
            next_phase = ?next_phase,
            "Cycle resumed"
        );
        self.emit_event(Event::CycleResumed {
            cycle_id: state.id,
            next_phase,
        });
        self.persist(&state).await;

        self.drive(&mut state).await;
        Ok(state)
    }

    async fn drive(&self, state: &mut CycleState) {
        if let Err(e) = self.drive_phases(state).await {
            if state.is_terminal() {
                error!(cycle_id = %state.id, error = %e, "Error after cycle finished");
            } else {
                let phase = state.next_phase();
                self.fail_cycle(state, phase, &e, 0, None).await;
            }
        }
    }

    async fn drive_phases(&self, state: &mut CycleState) -> Result<()> {
        while let Some(phase) = state.next_phase() {
            if self.abort.is_aborted() {
                self.abort_cycle(state).await;
                return Ok(());
            }

            if state.has_result(state.current_phase()) {
                CycleStateMachine::validate_transition(
                    &state.stage(),
                    &CycleStage::from_phase(phase),
                )?;
            }

            match self.run_phase(state, phase).await? {
                PhaseOutcome::Completed => continue,
                PhaseOutcome::Failed | PhaseOutcome::Aborted => return Ok(()),
            }
        }

        CycleStateMachine::validate_transition(&state.stage(), &CycleStage::Completed)?;
        state.complete()?;
        info!(
            cycle_id = %state.id,
            duration_secs = state.duration().map(|d| d.num_seconds()).unwrap_or_default(),
            "Cycle completed"
        );
        self.emit_event(Event::CycleCompleted { cycle_id: state.id });
        self.persist(state).await;
        Ok(())
    }

    async fn run_phase(&self, state: &mut CycleState, phase: PdcaPhase) -> Result<PhaseOutcome> {
        let max_attempts = self.config.retry.max_attempts();
        let mut attempt = 1;

        state.begin_phase(phase, attempt)?;
        // Every attempt sees the same inputs, whatever the history says.
        let snapshot = state.clone();

        loop {
            info!(cycle_id = %state.id, phase = %phase, attempt, "Phase started");
            self.emit_event(Event::PhaseStarted {
                cycle_id: state.id,
                phase,
                attempt,
            });
            self.persist(state).await;

            let outcome = tokio::select! {
                biased;
                _ = self.abort.aborted() => None,
                result = self.execute_with_timeout(phase, &snapshot) => Some(result),
            };

            let error = match outcome {
                None => {
                    self.abort_cycle(state).await;
                    return Ok(PhaseOutcome::Aborted);
                }
                Some(Ok(result)) => match self.apply(state, phase, result) {
                    Ok(()) => {
                        info!(cycle_id = %state.id, phase = %phase, attempt, "Phase completed");
                        self.emit_event(Event::PhaseCompleted {
                            cycle_id: state.id,
                            phase,
                        });
                        self.persist(state).await;
                        return Ok(PhaseOutcome::Completed);
                    }
                    Err(e) => e,
                },
                Some(Err(e)) => e,
            };

            warn!(
                cycle_id = %state.id,
                phase = %phase,
                attempt,
                error = %error,
                "Phase attempt failed"
            );
            state.record(
                TransitionKind::PhaseFailed,
                Some(phase),
                Some(attempt),
                Some(error.to_string()),
            )?;

            if !error.is_retryable() {
                self.fail_cycle(state, Some(phase), &error, attempt, None).await;
                return Ok(PhaseOutcome::Failed);
            }

            if attempt >= max_attempts {
                let exhausted = OrchestratorError::RetryExhausted {
                    phase,
                    attempts: attempt,
                    last_error: error.to_string(),
                };
                self.fail_cycle(state, Some(phase), &exhausted, attempt, Some(error.kind()))
                    .await;
                return Ok(PhaseOutcome::Failed);
            }

            attempt += 1;
            state.record(
                TransitionKind::PhaseRetrying,
                Some(phase),
                Some(attempt),
                Some(error.to_string()),
            )?;
            self.emit_event(Event::PhaseRetrying {
                cycle_id: state.id,
                phase,
                attempt,
                error: error.to_string(),
            });
            self.persist(state).await;

            if !self.config.retry.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.abort.aborted() => {
                        self.abort_cycle(state).await;
                        return Ok(PhaseOutcome::Aborted);
                    }
                    _ = tokio::time::sleep(self.config.retry.delay) => {}
                }
            }
            state.begin_phase(phase, attempt)?;
        }
    }

    async fn execute_with_timeout(
        &self,
        phase: PdcaPhase,
        snapshot: &CycleState,
    ) -> Result<PhaseResult> {
        let timeout = self.config.phase_timeout;
        match tokio::time::timeout(timeout, self.executor.execute(phase, snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::timeout(phase, timeout)),
        }
    }

    fn apply(&self, state: &mut CycleState, phase: PdcaPhase, result: PhaseResult) -> Result<()> {
        if result.phase() != phase {
            return Err(OrchestratorError::PhaseMismatch {
                expected: phase,
                got: result.phase(),
            });
        }
        state.apply_result(result).map_err(|e| match e {
            pdca_core::CoreError::Validation(message) => OrchestratorError::schema(phase, message),
            other => OrchestratorError::Core(other),
        })
    }

    async fn fail_cycle(
        &self,
        state: &mut CycleState,
        phase: Option<PdcaPhase>,
        error: &OrchestratorError,
        attempts: u32,
        cause: Option<FailureKind>,
    ) {
        let mut failure = CycleFailure::new(error.kind(), phase, error.to_string())
            .with_attempts(attempts);
        if let Some(cause) = cause {
            failure = failure.with_cause(cause);
        }

        if let Err(e) = state.fail(failure) {
            error!(cycle_id = %state.id, error = %e, "Could not mark cycle as failed");
            return;
        }
        error!(
            cycle_id = %state.id,
            phase = ?phase,
            attempts,
            error = %error,
            "Cycle failed"
        );
        self.emit_event(Event::CycleFailed {
            cycle_id: state.id,
            phase,
            error: error.to_string(),
        });
        self.persist(state).await;
    }

    async fn abort_cycle(&self, state: &mut CycleState) {
        if let Err(e) = state.abort(self.abort.reason()) {
            error!(cycle_id = %state.id, error = %e, "Could not abort cycle");
            return;
        }
        let last_completed_phase = state.last_completed_phase();
        warn!(
            cycle_id = %state.id,
            current_phase = %state.current_phase(),
            last_completed_phase = ?last_completed_phase,
            reason = %self.abort.reason(),
            "Cycle aborted"
        );
        self.emit_event(Event::CycleAborted {
            cycle_id: state.id,
            last_completed_phase,
        });
        self.persist(state).await;
    }

    fn emit_event(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event);
        }
    }

    /// Store failures never change the cycle outcome.
    async fn persist(&self, state: &CycleState) {
        if let Some(ref store) = self.store {
            if let Err(e) = store.save(state).await {
                error!(cycle_id = %state.id, error = %e, "Failed to persist cycle state");
                self.emit_event(Event::StoreFailed {
                    cycle_id: state.id,
                    error: e.to_string(),
                });
            }
        }
    }
}
