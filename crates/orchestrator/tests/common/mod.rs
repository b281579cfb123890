//! Shared helpers for orchestrator integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use orchestrator::{
    AbortHandle, AgentEngine, AgentPhaseExecutor, CycleOrchestrator, EngineError,
    OrchestratorConfig, PhaseRequest, RetryPolicy,
};
use pdca_core::PdcaPhase;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const PLAN_JSON: &str = r#"{
    "problem_definition": "Callers wait too long at peak hours",
    "context_analysis": "Two shifts, lunch peak between 12 and 14",
    "root_causes": ["No callback option", "New agents slow on billing questions"],
    "goals": [
        {"name": "shorter_waits", "metric": "wait_minutes", "target": 5.0, "unit": "min"}
    ],
    "action_plan": {
        "objectives": ["Average wait under 5 minutes"],
        "activities": [
            {"name": "add_callback", "description": "Offer callbacks above 3 minutes", "deadline": "2026-11-10", "priority": "critical"},
            {"name": "train_agents", "description": "Billing workshop", "deadline": "2026-11-20", "priority": "medium"}
        ],
        "schedule": {"start": "2026-10-20", "end": "2026-12-15", "milestones": ["callbacks live"]},
        "required_resources": ["telephony change request"],
        "responsible_map": {"add_callback": "it", "train_agents": "team lead"},
        "metrics": [
            {"name": "wait_minutes", "description": "Average queue wait", "target": 5.0, "unit": "min"},
            {"name": "first_call_resolution", "description": "Share solved on first call", "target": 0.8, "unit": "ratio"}
        ]
    }
}"#;

pub const DO_JSON: &str = r#"{
    "completed_activities": ["add_callback", "train_agents"],
    "collected_data": {"wait_minutes": [9, 7.5], "first_call_resolution": [0.71, "pending"]},
    "obstacles": ["Callback queue overflowed on Monday"],
    "adjustments": ["Capped callbacks at 40 per hour"],
    "narrative": "Callbacks live from week two"
}"#;

pub const CHECK_JSON: &str = r#"{
    "data_analysis": "Waits dropped but remain above target",
    "goal_comparison": [
        {"goal": "shorter_waits", "achieved_value": 7.5, "target_value": 5.0, "achievement_ratio": 0.67}
    ],
    "deviations": [
        {"description": "Lunch peak still 9 minutes", "category": "capacity", "magnitude": 4.0, "cause": "Breaks overlap the peak"}
    ],
    "effectiveness_assessment": "Partially effective",
    "visualizations": [
        {"title": "Wait by hour", "description": "Hourly average wait", "data_reference": "wait_minutes"}
    ],
    "synthesis": "Callbacks help, staffing at lunch is the bottleneck"
}"#;

pub const ACT_JSON: &str = r#"{
    "solutions": [
        {"problem_ref": "Breaks overlap the peak", "proposal": "Stagger breaks", "feasibility": "high", "impact": "medium"}
    ],
    "standardizations": ["Callback above 3 minutes"],
    "corrections": [
        {"deviation_ref": "Lunch peak still 9 minutes", "action": "Move breaks", "owner": "team lead", "deadline": "2026-12-01"}
    ],
    "lessons_learned": ["Callbacks cut peak waits", "Training needs floor time"],
    "next_cycle_recommendations": "Staff the lunch peak"
}"#;

pub const LESSONS: [&str; 2] = ["Callbacks cut peak waits", "Training needs floor time"];

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
        ("problem".to_string(), "Long call center waits".to_string()),
        ("objective".to_string(), "Average wait under 5 minutes".to_string()),
        ("context".to_string(), "Regional support desk".to_string()),
        ("deadline".to_string(), "2026-12-31".to_string()),
    ])
}

/// Stub engine answering with fenced fixture JSON, scriptable per cycle
/// and per phase.
#[derive(Default)]
pub struct ScriptedEngine {
    requests: Mutex<Vec<PhaseRequest>>,
    cycles_seen: Mutex<Vec<Uuid>>,
    failing_cycle: Option<usize>,
    flaky: Mutex<HashMap<PdcaPhase, u32>>,
    abort_after: Option<(PdcaPhase, AbortHandle)>,
    hang_on: Option<PdcaPhase>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request of the n-th distinct cycle (1-based) fails.
    pub fn failing_cycle(mut self, ordinal: usize) -> Self {
        self.failing_cycle = Some(ordinal);
        self
    }

    /// The first `times` requests for `phase` fail.
    pub fn flaky(self, phase: PdcaPhase, times: u32) -> Self {
        self.flaky.lock().unwrap().insert(phase, times);
        self
    }

    /// Raise `abort` while answering `phase`.
    pub fn abort_after(mut self, phase: PdcaPhase, abort: AbortHandle) -> Self {
        self.abort_after = Some((phase, abort));
        self
    }

    /// Never answer `phase`.
    pub fn hang_on(mut self, phase: PdcaPhase) -> Self {
        self.hang_on = Some(phase);
        self
    }

    pub fn requests(&self) -> Vec<PhaseRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, cycle_id: Uuid, phase: PdcaPhase) -> Vec<PhaseRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.cycle_id == cycle_id && r.phase == phase)
            .collect()
    }

    fn cycle_ordinal(&self, cycle_id: Uuid) -> usize {
        let mut seen = self.cycles_seen.lock().unwrap();
        match seen.iter().position(|id| *id == cycle_id) {
            Some(position) => position + 1,
            None => {
                seen.push(cycle_id);
                seen.len()
            }
        }
    }
}

#[async_trait]
impl AgentEngine for ScriptedEngine {
    async fn run_phase(&self, request: &PhaseRequest) -> Result<String, EngineError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.failing_cycle == Some(self.cycle_ordinal(request.cycle_id)) {
            return Err(EngineError::Failed("engine unavailable".to_string()));
        }

        let flaky = {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(&request.phase) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if flaky {
            return Err(EngineError::Status {
                status: 503,
                body: "busy".to_string(),
            });
        }

        if self.hang_on == Some(request.phase) {
            std::future::pending::<()>().await;
        }

        if let Some((phase, abort)) = &self.abort_after {
            if *phase == request.phase {
                abort.abort("stop requested");
            }
        }

        Ok(format!(
            "Here is the {} result.\n```json\n{}\n```\n",
            request.phase,
            raw(request.phase)
        ))
    }
}

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig::new().with_retry(RetryPolicy::new(2).with_delay(Duration::ZERO))
}

pub fn orchestrator(engine: Arc<ScriptedEngine>) -> CycleOrchestrator {
    CycleOrchestrator::new(Arc::new(AgentPhaseExecutor::new(engine)), config())
}
