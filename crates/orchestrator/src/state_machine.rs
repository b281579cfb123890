use pdca_core::CycleStage;

use crate::error::{OrchestratorError, Result};

/// Allowed moves between the stages of one cycle.
///
/// `Aborted` is reachable from every non-terminal stage; `Failed` from every
/// running stage. Terminal stages have no way out.
pub struct CycleStateMachine;

impl CycleStateMachine {
    pub fn validate_transition(from: &CycleStage, to: &CycleStage) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &CycleStage) -> Vec<CycleStage> {
        match from {
            // Restarted cycles enter at the first phase without a result.
            CycleStage::Pending => vec![
                CycleStage::Plan,
                CycleStage::Do,
                CycleStage::Check,
                CycleStage::Act,
                CycleStage::Aborted,
            ],
            CycleStage::Plan => vec![CycleStage::Do, CycleStage::Failed, CycleStage::Aborted],
            CycleStage::Do => vec![CycleStage::Check, CycleStage::Failed, CycleStage::Aborted],
            CycleStage::Check => vec![CycleStage::Act, CycleStage::Failed, CycleStage::Aborted],
            CycleStage::Act => vec![
                CycleStage::Completed,
                CycleStage::Failed,
                CycleStage::Aborted,
            ],
            CycleStage::Completed | CycleStage::Failed | CycleStage::Aborted => vec![],
        }
    }

    pub fn can_transition(from: &CycleStage, to: &CycleStage) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
