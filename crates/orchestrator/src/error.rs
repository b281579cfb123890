use pdca_core::{CoreError, FailureKind, PdcaPhase};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Schema validation failed for {phase}: {message}")]
    SchemaValidation { phase: PdcaPhase, message: String },

    #[error("Collaborator error during {phase}: {message}")]
    Collaborator {
        phase: PdcaPhase,
        message: String,
        timed_out: bool,
    },

    #[error("Phase {phase} requires the {missing} result")]
    PrerequisiteMissing {
        phase: PdcaPhase,
        missing: PdcaPhase,
    },

    #[error("Phase {phase} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        phase: PdcaPhase,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Executor asked to run {got} while the cycle is at {expected}")]
    PhaseMismatch { expected: PdcaPhase, got: PdcaPhase },

    #[error("Cycle state error: {0}")]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl OrchestratorError {
    pub fn schema(phase: PdcaPhase, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            phase,
            message: message.into(),
        }
    }

    pub fn collaborator(phase: PdcaPhase, message: impl Into<String>) -> Self {
        Self::Collaborator {
            phase,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(phase: PdcaPhase, after: std::time::Duration) -> Self {
        Self::Collaborator {
            phase,
            message: format!("no response within {}ms", after.as_millis()),
            timed_out: true,
        }
    }

    /// Whether the orchestrator may run the same phase again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SchemaValidation { .. } | Self::Collaborator { .. }
        )
    }

    /// Serialisable category stored in a terminal cycle.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SchemaValidation { .. } => FailureKind::SchemaValidation,
            Self::Collaborator { .. } => FailureKind::Collaborator,
            Self::PrerequisiteMissing { .. } => FailureKind::PrerequisiteMissing,
            Self::RetryExhausted { .. } => FailureKind::RetryExhausted,
            Self::Core(CoreError::PrerequisiteMissing { .. }) => FailureKind::PrerequisiteMissing,
            Self::Core(CoreError::Validation(_)) => FailureKind::SchemaValidation,
            _ => FailureKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failure reported by an agent engine before any output could be parsed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Engine reported failure: {0}")]
    Failed(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}
