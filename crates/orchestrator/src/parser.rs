//! Turn raw engine output into validated phase results.

use pdca_core::{
    ActResult, CheckResult, CycleState, DoResult, PdcaPhase, PhaseResult, PlanResult,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

pub struct OutputParser;

impl OutputParser {
    /// Pull the JSON payload out of a free-form answer.
    ///
    /// Tries, in order: a ```` ```json ```` fence, a bare fence whose body
    /// starts with `{`, then the outermost `{...}` span.
    pub fn extract_json(content: &str) -> String {
        if let Some(body) = fenced_block(content, r"(?s)```json\s*\n?(.*?)```") {
            return body;
        }

        if let Some(body) = fenced_block(content, r"(?s)```\s*\n(\{.*?)\n\s*```") {
            return body;
        }

        if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
            if start < end {
                return content[start..=end].to_string();
            }
        }

        content.trim().to_string()
    }

    /// Deserialize the payload for `phase` without cross-phase validation.
    pub fn parse_unchecked(phase: PdcaPhase, content: &str) -> Result<PhaseResult> {
        let json = Self::extract_json(content);
        let value: Value = serde_json::from_str(&json)
            .map_err(|e| OrchestratorError::schema(phase, format!("output is not JSON: {}", e)))?;
        let value = unwrap_envelope(phase, value)?;

        let result = match phase {
            PdcaPhase::Plan => PhaseResult::Plan(decode::<PlanResult>(phase, value)?),
            PdcaPhase::Do => PhaseResult::Do(decode::<DoResult>(phase, value)?),
            PdcaPhase::Check => PhaseResult::Check(decode::<CheckResult>(phase, value)?),
            PdcaPhase::Act => PhaseResult::Act(decode::<ActResult>(phase, value)?),
        };
        Ok(result)
    }

    /// Deserialize and validate against the results already in `state`.
    pub fn parse(phase: PdcaPhase, content: &str, state: &CycleState) -> Result<PhaseResult> {
        let result = Self::parse_unchecked(phase, content)?;
        Self::validate(&result, state)?;
        debug!(cycle_id = %state.id, phase = %phase, "Engine output parsed");
        Ok(result)
    }

    pub fn validate(result: &PhaseResult, state: &CycleState) -> Result<()> {
        let phase = result.phase();
        let outcome = match result {
            PhaseResult::Plan(plan) => plan.validate(),
            PhaseResult::Do(do_result) => match state.plan() {
                Some(plan) => do_result.validate(plan),
                None => return Err(missing(phase, PdcaPhase::Plan)),
            },
            PhaseResult::Check(check) => match state.plan() {
                Some(plan) => check.validate(plan),
                None => return Err(missing(phase, PdcaPhase::Plan)),
            },
            PhaseResult::Act(act) => act.validate(),
        };
        outcome.map_err(|e| OrchestratorError::schema(phase, e.to_string()))
    }
}

fn fenced_block(content: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let body = re.captures(content)?.get(1)?.as_str().trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Accept `{"phase": "...", "result": {...}}` as well as the bare record.
fn unwrap_envelope(phase: PdcaPhase, value: Value) -> Result<Value> {
    let Value::Object(mut map) = value else {
        return Err(OrchestratorError::schema(phase, "output is not a JSON object"));
    };

    if map.len() == 2 && map.contains_key("phase") && map.contains_key("result") {
        let tagged = map
            .get("phase")
            .and_then(Value::as_str)
            .and_then(PdcaPhase::parse);
        if tagged != Some(phase) {
            return Err(OrchestratorError::schema(
                phase,
                format!("output is tagged for phase {:?}", map.get("phase")),
            ));
        }
        return Ok(map.remove("result").unwrap_or(Value::Null));
    }

    Ok(Value::Object(map))
}

fn decode<T: DeserializeOwned>(phase: PdcaPhase, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| OrchestratorError::schema(phase, e.to_string()))
}

fn missing(phase: PdcaPhase, missing: PdcaPhase) -> OrchestratorError {
    OrchestratorError::PrerequisiteMissing { phase, missing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_extract_json_from_fence() {
        let content = "Here is the plan:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(OutputParser::extract_json(content), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_bare_fence() {
        let content = "Result:\n```\n{\"a\": {\"b\": 2}}\n```";
        assert_eq!(OutputParser::extract_json(content), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_extract_json_from_braces() {
        let content = "The answer is {\"a\": 1} as requested";
        assert_eq!(OutputParser::extract_json(content), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_each_phase() {
        let state = fixtures::state_after(PdcaPhase::Check);
        for phase in PdcaPhase::ALL {
            let result = OutputParser::parse(phase, fixtures::raw(phase), &state).unwrap();
            assert_eq!(result.phase(), phase);
        }
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let content = format!("Final plan below.\n```json\n{}\n```", fixtures::PLAN_JSON);
        let result = OutputParser::parse_unchecked(PdcaPhase::Plan, &content).unwrap();
        assert!(matches!(result, PhaseResult::Plan(_)));
    }

    #[test]
    fn test_tagged_envelope() {
        let content = format!(r#"{{"phase": "act", "result": {}}}"#, fixtures::ACT_JSON);
        assert!(OutputParser::parse_unchecked(PdcaPhase::Act, &content).is_ok());

        let err = OutputParser::parse_unchecked(PdcaPhase::Do, &content).unwrap_err();
        assert!(matches!(err, OrchestratorError::SchemaValidation { .. }));
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        let content = r#"{"solutions": [], "standardizations": [], "corrections": [], "lessons_learned": []}"#;
        let err = OutputParser::parse_unchecked(PdcaPhase::Act, content).unwrap_err();
        match err {
            OrchestratorError::SchemaValidation { phase, message } => {
                assert_eq!(phase, PdcaPhase::Act);
                assert!(message.contains("next_cycle_recommendations"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let content = fixtures::ACT_JSON.replacen('{', r#"{"mood": "great","#, 1);
        assert!(OutputParser::parse_unchecked(PdcaPhase::Act, &content).is_err());
    }

    #[test]
    fn test_not_json() {
        let err = OutputParser::parse_unchecked(PdcaPhase::Plan, "I could not do it").unwrap_err();
        assert!(matches!(err, OrchestratorError::SchemaValidation { .. }));
    }

    #[test]
    fn test_do_metric_must_exist_in_plan() {
        let state = fixtures::state_after(PdcaPhase::Plan);
        let content = fixtures::DO_JSON.replace("curing_days", "slump");
        let err = OutputParser::parse(PdcaPhase::Do, &content, &state).unwrap_err();
        match err {
            OrchestratorError::SchemaValidation { message, .. } => {
                assert!(message.contains("slump"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_check_without_plan_is_prerequisite_missing() {
        let state = fixtures::state();
        let err = OutputParser::parse(PdcaPhase::Check, fixtures::CHECK_JSON, &state).unwrap_err();
        assert!(matches!(err, OrchestratorError::PrerequisiteMissing { .. }));
    }
}
