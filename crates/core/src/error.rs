use thiserror::Error;
use uuid::Uuid;

use crate::domain::PdcaPhase;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Phase {phase} requires the {missing} result, which is absent")]
    PrerequisiteMissing {
        phase: PdcaPhase,
        missing: PdcaPhase,
    },

    #[error("Phase {0} result was already applied")]
    AlreadyApplied(PdcaPhase),

    #[error("Phase {got} cannot run while the cycle is in {expected}")]
    OutOfOrder {
        expected: PdcaPhase,
        got: PdcaPhase,
    },

    #[error("Cycle {0} is finalized and can no longer change")]
    CycleFinalized(Uuid),

    #[error("Invalid cycle status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
