//! Canned engine answers and cycle states for unit tests.

use pdca_core::{CycleState, PdcaPhase, PhaseResult};
use std::collections::BTreeMap;

use crate::parser::OutputParser;

pub const PLAN_JSON: &str = r#"{
    "problem_definition": "Cement strength below target",
    "context_analysis": "Two suppliers, winter temperatures",
    "root_causes": ["Short curing time", "Variable supplier quality"],
    "goals": [
        {"name": "strength", "metric": "compressive_strength", "target": 30.0, "unit": "MPa"}
    ],
    "action_plan": {
        "objectives": ["Raise strength to 30 MPa"],
        "activities": [
            {"name": "extend_curing", "description": "Cure for 10 days", "deadline": "2026-11-01", "priority": "high"},
            {"name": "audit_supplier", "description": "Audit supplier B", "deadline": "2026-11-15", "priority": "medium"}
        ],
        "schedule": {"start": "2026-10-20", "end": "2026-12-01", "milestones": ["curing extended"]},
        "required_resources": ["lab time"],
        "responsible_map": {"extend_curing": "site lead", "audit_supplier": "quality"},
        "metrics": [
            {"name": "compressive_strength", "description": "28-day strength", "target": 30.0, "unit": "MPa"},
            {"name": "curing_days", "description": "Days cured", "target": 10.0, "unit": "days"}
        ]
    }
}"#;

pub const DO_JSON: &str = r#"{
    "completed_activities": ["extend_curing"],
    "collected_data": {"curing_days": [10, 9, 10], "compressive_strength": [27.5, 28.1]},
    "obstacles": ["Cold snap"],
    "adjustments": ["Heated enclosure"],
    "narrative": "Curing extended on all pours"
}"#;

pub const CHECK_JSON: &str = r#"{
    "data_analysis": "Strength improved but short of target",
    "goal_comparison": [
        {"goal": "strength", "achieved_value": 28.1, "target_value": 30.0, "achievement_ratio": 0.94}
    ],
    "deviations": [
        {"description": "Strength 1.9 MPa short", "category": "quality", "magnitude": 1.9, "cause": "Supplier B"}
    ],
    "effectiveness_assessment": "Partially effective",
    "visualizations": [],
    "synthesis": "Extend the supplier audit"
}"#;

pub const ACT_JSON: &str = r#"{
    "solutions": [
        {"problem_ref": "Supplier B", "proposal": "Switch supplier", "feasibility": "high", "impact": "high"}
    ],
    "standardizations": ["10-day curing"],
    "corrections": [
        {"deviation_ref": "Strength 1.9 MPa short", "action": "Audit supplier B", "owner": "quality", "deadline": "2026-12-01"}
    ],
    "lessons_learned": ["Curing time drives strength", "Audit suppliers early"],
    "next_cycle_recommendations": "Focus on supplier quality"
}"#;

pub fn raw(phase: PdcaPhase) -> &'static str {
    match phase {
        PdcaPhase::Plan => PLAN_JSON,
        PdcaPhase::Do => DO_JSON,
        PdcaPhase::Check => CHECK_JSON,
        PdcaPhase::Act => ACT_JSON,
    }
}

pub fn inputs() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("problem".to_string(), "Cement strength below target".to_string()),
        ("objective".to_string(), "Reach 30 MPa".to_string()),
        ("context".to_string(), "Precast plant".to_string()),
    ])
}

pub fn state() -> CycleState {
    CycleState::new(inputs()).with_name("Cement strength")
}

pub fn result(phase: PdcaPhase) -> PhaseResult {
    OutputParser::parse_unchecked(phase, raw(phase)).expect("fixture parses")
}

/// A running cycle with every phase up to and including `last` applied.
pub fn state_after(last: PdcaPhase) -> CycleState {
    let mut state = state();
    state.start().expect("start");
    for phase in PdcaPhase::ALL.into_iter().take_while(|p| *p <= last) {
        state.begin_phase(phase, 1).expect("begin");
        state.apply_result(result(phase)).expect("apply");
    }
    state
}

/// Answers every phase with the canned fixture result.
pub struct FixtureExecutor;

#[async_trait::async_trait]
impl crate::executor::PhaseExecutor for FixtureExecutor {
    async fn execute(&self, phase: PdcaPhase, state: &CycleState) -> crate::Result<PhaseResult> {
        crate::executor::check_preconditions(phase, state)?;
        Ok(result(phase))
    }
}
