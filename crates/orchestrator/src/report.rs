//! Human-readable reports over finished or partial cycles.
//!
//! Rendering is pure: it reads the given states and nothing else. Phases
//! without a result are labelled `[not completed]`, never filled in.

use chrono::{DateTime, Utc};
use pdca_core::{
    ActResult, CheckResult, CycleFailure, CycleState, DoResult, PdcaPhase, PdcaStatus, PlanResult,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use uuid::Uuid;

pub const EMPTY_REPORT: &str = "# PDCA Report\n\nNo cycles recorded.\n";
const NOT_COMPLETED: &str = "[not completed]";

/// Compact, serialisable view of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub name: String,
    pub status: PdcaStatus,
    pub current_phase: PdcaPhase,
    pub previous_cycle_id: Option<Uuid>,
    pub restarted_from: Option<Uuid>,
    pub phases_completed: Vec<PdcaPhase>,
    pub event_count: usize,
    pub duration_secs: Option<i64>,
    pub lessons_count: usize,
    pub deviation_count: usize,
    pub team_revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<CycleFailure>,
    pub created_at: DateTime<Utc>,
}

impl From<&CycleState> for CycleSummary {
    fn from(state: &CycleState) -> Self {
        Self {
            cycle_id: state.id,
            name: state.name.clone(),
            status: state.status(),
            current_phase: state.current_phase(),
            previous_cycle_id: state.previous_cycle_id,
            restarted_from: state.restarted_from(),
            phases_completed: state.completed_phases(),
            event_count: state.history().len(),
            duration_secs: state.duration().map(|d| d.num_seconds()),
            lessons_count: state.act().map_or(0, |a| a.lessons_learned.len()),
            deviation_count: state.check().map_or(0, |c| c.deviations.len()),
            team_revision: state.team().revision,
            failure: state.failure().cloned(),
            created_at: state.created_at,
        }
    }
}

pub struct ReportGenerator;

impl ReportGenerator {
    pub fn render(states: &[CycleState]) -> String {
        if states.is_empty() {
            return EMPTY_REPORT.to_string();
        }

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_report(&mut out, states);
        out
    }

    pub fn summaries(states: &[CycleState]) -> Vec<CycleSummary> {
        states.iter().map(CycleSummary::from).collect()
    }
}

fn write_report(out: &mut String, states: &[CycleState]) -> fmt::Result {
    let completed = states
        .iter()
        .filter(|s| s.status() == PdcaStatus::Completed)
        .count();
    writeln!(out, "# PDCA Report")?;
    writeln!(out)?;
    writeln!(out, "Cycles: {} ({} completed)", states.len(), completed)?;

    for (index, state) in states.iter().enumerate() {
        writeln!(out)?;
        write_cycle(out, index + 1, state)?;
    }
    Ok(())
}

fn write_cycle(out: &mut String, index: usize, state: &CycleState) -> fmt::Result {
    writeln!(out, "## Cycle {}: {}", index, state.name)?;
    writeln!(out)?;
    writeln!(out, "- ID: {}", state.id)?;
    writeln!(out, "- Status: {}", state.status())?;
    writeln!(out, "- Stage: {}", state.stage())?;
    writeln!(out, "- Current phase: {}", state.current_phase())?;
    if !state.description.is_empty() {
        writeln!(out, "- Description: {}", state.description)?;
    }
    if let Some(previous) = state.previous_cycle_id {
        writeln!(out, "- Previous cycle: {}", previous)?;
    }
    if let Some(origin) = state.restarted_from() {
        writeln!(out, "- Restarted from: {}", origin)?;
    }
    writeln!(out, "- Created: {}", state.created_at.to_rfc3339())?;
    writeln!(out, "- Started: {}", timestamp(state.started_at()))?;
    writeln!(out, "- Finished: {}", timestamp(state.completed_at()))?;
    match state.duration() {
        Some(d) => writeln!(out, "- Duration: {}s", d.num_seconds())?,
        None => writeln!(out, "- Duration: -")?,
    }
    writeln!(out, "- Events: {}", state.history().len())?;
    writeln!(
        out,
        "- Team: revision {}, {} agents",
        state.team().revision,
        state.team().agent_count()
    )?;

    writeln!(out)?;
    writeln!(out, "### Inputs")?;
    writeln!(out)?;
    if state.inputs().is_empty() {
        writeln!(out, "(none)")?;
    }
    for (key, value) in state.inputs() {
        writeln!(out, "- {}: {}", key, value)?;
    }

    for phase in PdcaPhase::ALL {
        writeln!(out)?;
        writeln!(out, "### {}", phase.title())?;
        writeln!(out)?;
        match phase {
            PdcaPhase::Plan => section(out, state.plan(), write_plan)?,
            PdcaPhase::Do => section(out, state.do_result(), write_do)?,
            PdcaPhase::Check => section(out, state.check(), write_check)?,
            PdcaPhase::Act => section(out, state.act(), write_act)?,
        }
    }

    if let Some(failure) = state.failure() {
        writeln!(out)?;
        write_failure(out, failure)?;
    }

    writeln!(out)?;
    writeln!(out, "### History")?;
    writeln!(out)?;
    for (i, entry) in state.history().iter().enumerate() {
        write!(
            out,
            "{}. {} {}",
            i + 1,
            entry.timestamp.to_rfc3339(),
            entry.kind.as_str()
        )?;
        if let Some(phase) = entry.phase {
            write!(out, " [{}]", phase)?;
        }
        if let Some(attempt) = entry.attempt {
            write!(out, " attempt {}", attempt)?;
        }
        write!(out, " -> {}", entry.status)?;
        if let Some(detail) = &entry.detail {
            write!(out, ": {}", detail)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn section<T>(
    out: &mut String,
    value: Option<&T>,
    write: fn(&mut String, &T) -> fmt::Result,
) -> fmt::Result {
    match value {
        Some(value) => write(out, value),
        None => writeln!(out, "{}", NOT_COMPLETED),
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
}

fn list(out: &mut String, title: &str, items: &[String]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}:", title)?;
    for item in items {
        writeln!(out, "- {}", item)?;
    }
    Ok(())
}

fn write_plan(out: &mut String, plan: &PlanResult) -> fmt::Result {
    writeln!(out, "Problem: {}", plan.problem_definition)?;
    writeln!(out, "Context: {}", plan.context_analysis)?;
    list(out, "Root causes", &plan.root_causes)?;

    if !plan.goals.is_empty() {
        writeln!(out, "Goals:")?;
        for goal in &plan.goals {
            writeln!(
                out,
                "- {}: {} {} {}",
                goal.name, goal.metric, goal.target, goal.unit
            )?;
        }
    }

    let action_plan = &plan.action_plan;
    list(out, "Objectives", &action_plan.objectives)?;
    if !action_plan.activities.is_empty() {
        writeln!(out, "Activities:")?;
        for activity in &action_plan.activities {
            let owner = action_plan
                .responsible_map
                .get(&activity.name)
                .map(String::as_str)
                .unwrap_or("unassigned");
            writeln!(
                out,
                "- {} ({}, due {}, owner {}): {}",
                activity.name,
                activity.priority.as_str(),
                activity.deadline,
                owner,
                activity.description
            )?;
        }
    }
    writeln!(
        out,
        "Schedule: {} to {}",
        action_plan.schedule.start, action_plan.schedule.end
    )?;
    list(out, "Milestones", &action_plan.schedule.milestones)?;
    list(out, "Resources", &action_plan.required_resources)?;
    if !action_plan.metrics.is_empty() {
        writeln!(out, "Metrics:")?;
        for metric in &action_plan.metrics {
            writeln!(
                out,
                "- {}: target {} {} ({})",
                metric.name, metric.target, metric.unit, metric.description
            )?;
        }
    }
    Ok(())
}

fn write_do(out: &mut String, result: &DoResult) -> fmt::Result {
    list(out, "Completed activities", &result.completed_activities)?;
    if !result.collected_data.is_empty() {
        writeln!(out, "Collected data:")?;
        for (metric, observations) in &result.collected_data {
            let values: Vec<String> = observations.iter().map(ToString::to_string).collect();
            writeln!(out, "- {}: {}", metric, values.join(", "))?;
        }
    }
    list(out, "Obstacles", &result.obstacles)?;
    list(out, "Adjustments", &result.adjustments)?;
    writeln!(out, "Narrative: {}", result.narrative)
}

fn write_check(out: &mut String, check: &CheckResult) -> fmt::Result {
    writeln!(out, "Analysis: {}", check.data_analysis)?;
    if !check.goal_comparison.is_empty() {
        writeln!(out, "Goal comparison:")?;
        for row in &check.goal_comparison {
            writeln!(
                out,
                "- {}: {} of {} ({:.0}%)",
                row.goal,
                row.achieved_value,
                row.target_value,
                row.achievement_ratio * 100.0
            )?;
        }
    }
    if check.deviations.is_empty() {
        writeln!(out, "Deviations: none")?;
    } else {
        writeln!(out, "Deviations:")?;
        for deviation in &check.deviations {
            writeln!(
                out,
                "- [{}] {} (magnitude {}, cause: {})",
                deviation.category, deviation.description, deviation.magnitude, deviation.cause
            )?;
        }
    }
    writeln!(out, "Effectiveness: {}", check.effectiveness_assessment)?;
    for chart in &check.visualizations {
        writeln!(
            out,
            "Chart {}: {} ({})",
            chart.title, chart.description, chart.data_reference
        )?;
    }
    writeln!(out, "Synthesis: {}", check.synthesis)
}

fn write_act(out: &mut String, act: &ActResult) -> fmt::Result {
    if !act.solutions.is_empty() {
        writeln!(out, "Solutions:")?;
        for solution in &act.solutions {
            writeln!(
                out,
                "- {}: {} (feasibility {}, impact {})",
                solution.problem_ref, solution.proposal, solution.feasibility, solution.impact
            )?;
        }
    }
    list(out, "Standardizations", &act.standardizations)?;
    if !act.corrections.is_empty() {
        writeln!(out, "Corrections:")?;
        for correction in &act.corrections {
            writeln!(
                out,
                "- {}: {} (owner {}, due {})",
                correction.deviation_ref, correction.action, correction.owner, correction.deadline
            )?;
        }
    }
    list(out, "Lessons learned", &act.lessons_learned)?;
    writeln!(
        out,
        "Next cycle recommendations: {}",
        act.next_cycle_recommendations
    )
}

fn write_failure(out: &mut String, failure: &CycleFailure) -> fmt::Result {
    writeln!(out, "### Failure")?;
    writeln!(out)?;
    writeln!(out, "- Kind: {}", failure.kind.as_str())?;
    if let Some(cause) = failure.cause {
        writeln!(out, "- Cause: {}", cause.as_str())?;
    }
    match failure.phase {
        Some(phase) => writeln!(out, "- Phase: {}", phase)?,
        None => writeln!(out, "- Phase: -")?,
    }
    writeln!(out, "- Attempts: {}", failure.attempts)?;
    writeln!(out, "- Message: {}", failure.message)
}
