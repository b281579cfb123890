//! Typed records produced by each PDCA phase.
//!
//! Every record rejects unknown fields and has no defaults for required
//! fields, so a structurally incomplete engine answer fails to deserialize.
//! Cross-field invariants that serde cannot express live in the
//! `validate` methods.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::domain::PdcaPhase;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Goal {
    pub name: String,
    pub metric: String,
    pub target: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Activity {
    pub name: String,
    pub description: String,
    pub deadline: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    pub start: String,
    pub end: String,
    pub milestones: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub target: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionPlan {
    pub objectives: Vec<String>,
    pub activities: Vec<Activity>,
    pub schedule: Schedule,
    pub required_resources: Vec<String>,
    /// Activity name to owner.
    pub responsible_map: BTreeMap<String, String>,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlanResult {
    pub problem_definition: String,
    pub context_analysis: String,
    pub root_causes: Vec<String>,
    pub goals: Vec<Goal>,
    pub action_plan: ActionPlan,
}

impl PlanResult {
    pub fn validate(&self) -> Result<()> {
        if self.problem_definition.trim().is_empty() {
            return Err(CoreError::validation("plan problem_definition is empty"));
        }

        let mut activities = HashSet::new();
        for activity in &self.action_plan.activities {
            if !activities.insert(activity.name.as_str()) {
                return Err(CoreError::validation(format!(
                    "duplicate activity '{}'",
                    activity.name
                )));
            }
        }

        let mut metrics = HashSet::new();
        for metric in &self.action_plan.metrics {
            if !metrics.insert(metric.name.as_str()) {
                return Err(CoreError::validation(format!(
                    "duplicate metric '{}'",
                    metric.name
                )));
            }
        }

        if let Some(unknown) = self
            .action_plan
            .responsible_map
            .keys()
            .find(|name| !activities.contains(name.as_str()))
        {
            return Err(CoreError::validation(format!(
                "responsible_map references unknown activity '{}'",
                unknown
            )));
        }

        if let Some(goal) = self
            .goals
            .iter()
            .find(|goal| !metrics.contains(goal.metric.as_str()))
        {
            return Err(CoreError::validation(format!(
                "goal '{}' references unknown metric '{}'",
                goal.name, goal.metric
            )));
        }

        Ok(())
    }

    pub fn has_metric(&self, name: &str) -> bool {
        self.action_plan.metrics.iter().any(|m| m.name == name)
    }

    pub fn has_goal(&self, name: &str) -> bool {
        self.goals.iter().any(|g| g.name == name)
    }
}

/// A single recorded measurement, either numeric or free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Observation {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DoResult {
    pub completed_activities: Vec<String>,
    /// Metric name to observations, in collection order.
    pub collected_data: BTreeMap<String, Vec<Observation>>,
    pub obstacles: Vec<String>,
    pub adjustments: Vec<String>,
    pub narrative: String,
}

impl DoResult {
    pub fn validate(&self, plan: &PlanResult) -> Result<()> {
        if let Some(metric) = self
            .collected_data
            .keys()
            .find(|metric| !plan.has_metric(metric))
        {
            return Err(CoreError::validation(format!(
                "collected_data references metric '{}' not defined in the plan",
                metric
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GoalComparison {
    pub goal: String,
    pub achieved_value: f64,
    pub target_value: f64,
    pub achievement_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Deviation {
    pub description: String,
    pub category: String,
    pub magnitude: f64,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Visualization {
    pub title: String,
    pub description: String,
    pub data_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CheckResult {
    pub data_analysis: String,
    pub goal_comparison: Vec<GoalComparison>,
    pub deviations: Vec<Deviation>,
    pub effectiveness_assessment: String,
    pub visualizations: Vec<Visualization>,
    pub synthesis: String,
}

impl CheckResult {
    pub fn validate(&self, plan: &PlanResult) -> Result<()> {
        for comparison in &self.goal_comparison {
            if !plan.has_goal(&comparison.goal) {
                return Err(CoreError::validation(format!(
                    "goal_comparison references unknown goal '{}'",
                    comparison.goal
                )));
            }
            if !comparison.achievement_ratio.is_finite() || comparison.achievement_ratio < 0.0 {
                return Err(CoreError::validation(format!(
                    "goal '{}' has invalid achievement_ratio {}",
                    comparison.goal, comparison.achievement_ratio
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Solution {
    pub problem_ref: String,
    pub proposal: String,
    pub feasibility: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Correction {
    pub deviation_ref: String,
    pub action: String,
    pub owner: String,
    pub deadline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActResult {
    pub solutions: Vec<Solution>,
    pub standardizations: Vec<String>,
    pub corrections: Vec<Correction>,
    pub lessons_learned: Vec<String>,
    pub next_cycle_recommendations: String,
}

impl ActResult {
    pub fn validate(&self) -> Result<()> {
        if self.lessons_learned.iter().any(|l| l.trim().is_empty()) {
            return Err(CoreError::validation("lessons_learned contains an empty entry"));
        }
        Ok(())
    }
}

/// The output of any single phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", content = "result", rename_all = "snake_case")]
pub enum PhaseResult {
    Plan(PlanResult),
    Do(DoResult),
    Check(CheckResult),
    Act(ActResult),
}

impl PhaseResult {
    pub fn phase(&self) -> PdcaPhase {
        match self {
            Self::Plan(_) => PdcaPhase::Plan,
            Self::Do(_) => PdcaPhase::Do,
            Self::Check(_) => PdcaPhase::Check,
            Self::Act(_) => PdcaPhase::Act,
        }
    }
}
