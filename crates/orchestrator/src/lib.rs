//! PDCA cycle orchestration.
//!
//! [`CycleOrchestrator`] drives one cycle through Plan, Do, Check and Act
//! using a [`PhaseExecutor`]; [`ContinuousRunner`] chains cycles so each
//! one starts from the lessons of the ones before; [`ReportGenerator`]
//! renders the results.

pub mod abort;
pub mod composer;
pub mod config;
pub mod continuous_runner;
pub mod cycle_orchestrator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod state_machine;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use abort::AbortHandle;
pub use composer::{DeviationSpecialistComposer, StaticComposer, TeamComposer};
pub use config::{ContinuousConfig, LessonsMerge, OrchestratorConfig, RetryPolicy};
pub use continuous_runner::{seed_inputs, ContinuousRunner};
pub use cycle_orchestrator::CycleOrchestrator;
pub use engine::{AgentEngine, HttpAgentEngine};
pub use error::{EngineError, OrchestratorError, Result};
pub use executor::{AgentPhaseExecutor, PhaseExecutor};
pub use parser::OutputParser;
pub use prompts::{PhaseInputs, PhaseRequest};
pub use report::{CycleSummary, ReportGenerator};
pub use state_machine::CycleStateMachine;
pub use store::{load_required, CycleStore, JsonCycleStore};
