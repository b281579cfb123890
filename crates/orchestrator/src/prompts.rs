//! Structured inputs handed to the agent engine for each phase.
//!
//! Each phase sees the cycle's original inputs that matter to it plus the
//! serialised results of the phases before it.

use pdca_core::{AgentProfile, CycleState, PdcaPhase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Input keys forwarded to Plan when present.
const PLAN_KEYS: &[&str] = &[
    "problem",
    "context",
    "objective",
    "constraints",
    "deadline",
    "resources",
    "problem_definition",
    "context_analysis",
    "previous_cycle_id",
    "previous_recommendations",
    "prior_lessons",
    "previous_cycle_outcome",
];
const DO_KEYS: &[&str] = &["context", "resources"];
const CHECK_KEYS: &[&str] = &["objective"];
const ACT_KEYS: &[&str] = &["objective", "problem"];

/// Tooling hint and expected effort for a phase.
pub fn tool_focus(phase: PdcaPhase) -> (&'static str, &'static str) {
    match phase {
        PdcaPhase::Plan => ("root cause analysis, goal setting", "high"),
        PdcaPhase::Do => ("task execution, progress monitoring", "medium"),
        PdcaPhase::Check => ("result analysis, deviation identification", "high"),
        PdcaPhase::Act => ("process standardization, improvement planning", "medium"),
    }
}

/// Scrub characters that upset template-based engines.
pub fn sanitize_input(text: &str) -> String {
    text.replace('%', " percent ")
        .replace(['{', '}', '(', ')'], " ")
        .replace(['/', '\\'], "-")
        .replace("\"\"\"", "")
        .replace('\'', "")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseInputs(BTreeMap<String, String>);

impl PhaseInputs {
    pub fn build(phase: PdcaPhase, state: &CycleState, sanitize: bool) -> Result<Self> {
        let mut inputs = Self::default();

        match phase {
            PdcaPhase::Plan => {
                inputs.copy_from(state, PLAN_KEYS);
            }
            PdcaPhase::Do => {
                inputs.insert_json("action_plan", require(phase, PdcaPhase::Plan, state.plan())?)?;
                inputs.copy_from(state, DO_KEYS);
            }
            PdcaPhase::Check => {
                let plan = require(phase, PdcaPhase::Plan, state.plan())?;
                inputs.insert_json("action_plan", plan)?;
                inputs.insert_json(
                    "do_result",
                    require(phase, PdcaPhase::Do, state.do_result())?,
                )?;
                inputs.insert_json("metrics", &plan.action_plan.metrics)?;
                inputs.copy_from(state, CHECK_KEYS);
            }
            PdcaPhase::Act => {
                inputs.insert_json("action_plan", require(phase, PdcaPhase::Plan, state.plan())?)?;
                inputs.insert_json(
                    "do_result",
                    require(phase, PdcaPhase::Do, state.do_result())?,
                )?;
                inputs.insert_json(
                    "check_result",
                    require(phase, PdcaPhase::Check, state.check())?,
                )?;
                inputs.copy_from(state, ACT_KEYS);
            }
        }

        let (focus, complexity) = tool_focus(phase);
        inputs.insert("tool_focus", focus);
        inputs.insert("complexity", complexity);

        if sanitize {
            for value in inputs.0.values_mut() {
                *value = sanitize_input(value);
            }
        }

        Ok(inputs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    fn copy_from(&mut self, state: &CycleState, keys: &[&str]) {
        for key in keys {
            if let Some(value) = state.input(key) {
                self.insert(*key, value);
            }
        }
    }

    fn insert_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| OrchestratorError::Serialization(format!("{}: {}", key, e)))?;
        self.insert(key, json);
        Ok(())
    }
}

fn require<T>(phase: PdcaPhase, missing: PdcaPhase, value: Option<&T>) -> Result<&T> {
    value.ok_or(OrchestratorError::PrerequisiteMissing { phase, missing })
}

/// Everything the engine receives for one phase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub cycle_id: Uuid,
    pub phase: PdcaPhase,
    pub inputs: PhaseInputs,
    pub agents: Vec<AgentProfile>,
}

impl PhaseRequest {
    pub fn new(state: &CycleState, phase: PdcaPhase, inputs: PhaseInputs) -> Self {
        Self {
            cycle_id: state.id,
            phase,
            inputs,
            agents: state.team().for_phase(phase).to_vec(),
        }
    }
}
