use async_trait::async_trait;
use pdca_core::{CoreError, CycleState, PdcaPhase, PhaseResult};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::AgentEngine;
use crate::error::{EngineError, OrchestratorError, Result};
use crate::parser::OutputParser;
use crate::prompts::{PhaseInputs, PhaseRequest};

/// Runs one phase against an immutable view of the cycle.
///
/// Implementations never touch the state; the orchestrator applies the
/// returned result.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn execute(&self, phase: PdcaPhase, state: &CycleState) -> Result<PhaseResult>;
}

/// Executor backed by an [`AgentEngine`].
pub struct AgentPhaseExecutor {
    engine: Arc<dyn AgentEngine>,
    sanitize_inputs: bool,
}

impl AgentPhaseExecutor {
    pub fn new(engine: Arc<dyn AgentEngine>) -> Self {
        Self {
            engine,
            sanitize_inputs: false,
        }
    }

    pub fn with_sanitize_inputs(mut self, sanitize: bool) -> Self {
        self.sanitize_inputs = sanitize;
        self
    }
}

/// Reject calls whose phase does not match the cycle or whose inputs are
/// incomplete.
pub fn check_preconditions(phase: PdcaPhase, state: &CycleState) -> Result<()> {
    if state.current_phase() != phase {
        return Err(OrchestratorError::PhaseMismatch {
            expected: state.current_phase(),
            got: phase,
        });
    }
    state.check_prerequisites(phase).map_err(|e| match e {
        CoreError::PrerequisiteMissing { phase, missing } => {
            OrchestratorError::PrerequisiteMissing { phase, missing }
        }
        other => OrchestratorError::Core(other),
    })
}

#[async_trait]
impl PhaseExecutor for AgentPhaseExecutor {
    async fn execute(&self, phase: PdcaPhase, state: &CycleState) -> Result<PhaseResult> {
        check_preconditions(phase, state)?;

        let inputs = PhaseInputs::build(phase, state, self.sanitize_inputs)?;
        debug!(
            cycle_id = %state.id,
            phase = %phase,
            input_keys = inputs.len(),
            "Phase inputs built"
        );
        let request = PhaseRequest::new(state, phase, inputs);

        let output = self.engine.run_phase(&request).await.map_err(|e| {
            warn!(cycle_id = %state.id, phase = %phase, error = %e, "Engine call failed");
            match e {
                EngineError::Request(message)
                | EngineError::Failed(message) => OrchestratorError::collaborator(phase, message),
                status @ EngineError::Status { .. } => {
                    OrchestratorError::collaborator(phase, status.to_string())
                }
            }
        })?;

        OutputParser::parse(phase, &output, state)
    }
}
