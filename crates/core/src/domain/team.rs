use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::PdcaPhase;

/// Named configuration record for one agent, passed opaquely to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: String,
    pub role: String,
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: String::new(),
            tools: Vec::new(),
            model: None,
        }
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Executor bindings for a cycle: which agents work each phase.
///
/// `revision` increases every time a composer changes the team so reports
/// can tell adapted teams apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamComposition {
    pub revision: u32,
    pub agents: BTreeMap<PdcaPhase, Vec<AgentProfile>>,
}

impl TeamComposition {
    pub fn empty() -> Self {
        Self {
            revision: 0,
            agents: BTreeMap::new(),
        }
    }

    pub fn for_phase(&self, phase: PdcaPhase) -> &[AgentProfile] {
        self.agents.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_agent(&self, phase: PdcaPhase, name: &str) -> bool {
        self.for_phase(phase).iter().any(|a| a.name == name)
    }

    /// Add an agent to a phase unless one with the same name is already there.
    /// Returns whether the team changed.
    pub fn add_agent(&mut self, phase: PdcaPhase, agent: AgentProfile) -> bool {
        if self.has_agent(phase, &agent.name) {
            return false;
        }
        self.agents.entry(phase).or_default().push(agent);
        true
    }

    pub fn agent_count(&self) -> usize {
        self.agents.values().map(Vec::len).sum()
    }
}

impl Default for TeamComposition {
    /// The standard four crews of a PDCA improvement effort.
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(
            PdcaPhase::Plan,
            vec![
                AgentProfile::new(
                    "problem_analyst",
                    "Problem analyst",
                    "Define the problem precisely and measurably",
                ),
                AgentProfile::new(
                    "context_analyst",
                    "Context analyst",
                    "Map the environment and constraints around the problem",
                ),
                AgentProfile::new(
                    "root_cause_analyst",
                    "Root cause analyst",
                    "Identify the root causes behind the problem",
                ),
                AgentProfile::new(
                    "goal_setter",
                    "Goal setter",
                    "Set measurable goals with targets and units",
                ),
                AgentProfile::new(
                    "action_planner",
                    "Action planner",
                    "Turn goals into activities, schedule and owners",
                ),
                AgentProfile::new(
                    "plan_integrator",
                    "Plan integrator",
                    "Consolidate the analysis into one coherent plan",
                ),
            ],
        );
        agents.insert(
            PdcaPhase::Do,
            vec![
                AgentProfile::new(
                    "implementation_coordinator",
                    "Implementation coordinator",
                    "Prepare and coordinate execution of the plan",
                ),
                AgentProfile::new(
                    "task_executor",
                    "Task executor",
                    "Carry out the planned activities",
                ),
                AgentProfile::new(
                    "data_collector",
                    "Data collector",
                    "Collect observations for every planned metric",
                ),
                AgentProfile::new(
                    "resource_manager",
                    "Resource manager",
                    "Allocate and track the required resources",
                ),
                AgentProfile::new(
                    "progress_monitor",
                    "Progress monitor",
                    "Track progress and record obstacles and adjustments",
                ),
                AgentProfile::new(
                    "process_documenter",
                    "Process documenter",
                    "Document how the plan was executed",
                ),
            ],
        );
        agents.insert(
            PdcaPhase::Check,
            vec![
                AgentProfile::new(
                    "data_analyst",
                    "Data analyst",
                    "Analyse the collected data",
                ),
                AgentProfile::new(
                    "goal_comparator",
                    "Goal comparator",
                    "Compare achieved values against the goals",
                ),
                AgentProfile::new(
                    "deviation_analyst",
                    "Deviation analyst",
                    "Identify deviations and their causes",
                ),
                AgentProfile::new(
                    "effectiveness_assessor",
                    "Effectiveness assessor",
                    "Judge how effective the actions were",
                ),
            ],
        );
        agents.insert(
            PdcaPhase::Act,
            vec![
                AgentProfile::new(
                    "problem_solver",
                    "Problem solver",
                    "Propose solutions for the problems found",
                ),
                AgentProfile::new(
                    "improvement_standardizer",
                    "Improvement standardizer",
                    "Standardize the improvements that worked",
                ),
                AgentProfile::new(
                    "deviation_corrector",
                    "Deviation corrector",
                    "Plan corrective actions for each deviation",
                ),
                AgentProfile::new(
                    "lessons_documenter",
                    "Lessons documenter",
                    "Record the lessons learned",
                ),
                AgentProfile::new(
                    "next_cycle_preparer",
                    "Next cycle preparer",
                    "Recommend the focus of the next cycle",
                ),
            ],
        );

        Self {
            revision: 0,
            agents,
        }
    }
}
