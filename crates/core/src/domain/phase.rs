use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four PDCA phases, in execution order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PdcaPhase {
    #[default]
    Plan,
    Do,
    Check,
    Act,
}

impl PdcaPhase {
    pub const ALL: [PdcaPhase; 4] = [Self::Plan, Self::Do, Self::Check, Self::Act];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Do => "do",
            Self::Check => "check",
            Self::Act => "act",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "do" => Some(Self::Do),
            "check" => Some(Self::Check),
            "act" => Some(Self::Act),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Plan => Some(Self::Do),
            Self::Do => Some(Self::Check),
            Self::Check => Some(Self::Act),
            Self::Act => None,
        }
    }

    pub fn previous(&self) -> Option<Self> {
        match self {
            Self::Plan => None,
            Self::Do => Some(Self::Plan),
            Self::Check => Some(Self::Do),
            Self::Act => Some(Self::Check),
        }
    }

    /// Phases whose results must be present before this phase may run.
    pub fn prerequisites(&self) -> &'static [PdcaPhase] {
        match self {
            Self::Plan => &[],
            Self::Do => &[Self::Plan],
            Self::Check => &[Self::Plan, Self::Do],
            Self::Act => &[Self::Plan, Self::Do, Self::Check],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Plan => "Plan",
            Self::Do => "Do",
            Self::Check => "Check",
            Self::Act => "Act",
        }
    }
}

impl fmt::Display for PdcaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PdcaStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Aborted,
}

impl PdcaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for PdcaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a cycle in the orchestration state machine.
///
/// Unlike [`PdcaStatus`], this folds the running phase into the state:
/// `Pending -> Plan -> Do -> Check -> Act -> Completed`, with `Failed` and
/// `Aborted` reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Pending,
    Plan,
    Do,
    Check,
    Act,
    Completed,
    Failed,
    Aborted,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Plan => "plan",
            Self::Do => "do",
            Self::Check => "check",
            Self::Act => "act",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn from_phase(phase: PdcaPhase) -> Self {
        match phase {
            PdcaPhase::Plan => Self::Plan,
            PdcaPhase::Do => Self::Do,
            PdcaPhase::Check => Self::Check,
            PdcaPhase::Act => Self::Act,
        }
    }

    pub fn phase(&self) -> Option<PdcaPhase> {
        match self {
            Self::Plan => Some(PdcaPhase::Plan),
            Self::Do => Some(PdcaPhase::Do),
            Self::Check => Some(PdcaPhase::Check),
            Self::Act => Some(PdcaPhase::Act),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert_eq!(PdcaPhase::Plan.next(), Some(PdcaPhase::Do));
        assert_eq!(PdcaPhase::Act.next(), None);
        assert!(PdcaPhase::Plan < PdcaPhase::Do);
        assert!(PdcaPhase::Check < PdcaPhase::Act);
        assert_eq!(PdcaPhase::Check.previous(), Some(PdcaPhase::Do));
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!(PdcaPhase::parse("check"), Some(PdcaPhase::Check));
        assert_eq!(PdcaPhase::parse(" Act "), Some(PdcaPhase::Act));
        assert_eq!(PdcaPhase::parse("review"), None);
    }

    #[test]
    fn test_prerequisites() {
        assert!(PdcaPhase::Plan.prerequisites().is_empty());
        assert_eq!(
            PdcaPhase::Check.prerequisites(),
            &[PdcaPhase::Plan, PdcaPhase::Do]
        );
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(PdcaStatus::InProgress.as_str(), "in_progress");
        assert_eq!(
            serde_json::to_string(&PdcaStatus::Aborted).unwrap(),
            "\"aborted\""
        );
        assert_eq!(PdcaStatus::parse("failed"), Some(PdcaStatus::Failed));
        assert!(PdcaStatus::Completed.is_terminal());
        assert!(!PdcaStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_stage_phase_mapping() {
        for phase in PdcaPhase::ALL {
            assert_eq!(CycleStage::from_phase(phase).phase(), Some(phase));
        }
        assert_eq!(CycleStage::Pending.phase(), None);
        assert!(CycleStage::Aborted.is_terminal());
    }
}
