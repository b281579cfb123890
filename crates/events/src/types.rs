//! Event types for cycle orchestration

use chrono::{DateTime, Utc};
use pdca_core::PdcaPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All lifecycle events emitted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Cycle events
    /// A cycle left the pending state
    #[serde(rename = "cycle.started")]
    CycleStarted { cycle_id: Uuid, name: String },

    /// A persisted cycle was picked up again
    #[serde(rename = "cycle.resumed")]
    CycleResumed {
        cycle_id: Uuid,
        next_phase: Option<PdcaPhase>,
    },

    /// All four phases finished
    #[serde(rename = "cycle.completed")]
    CycleCompleted { cycle_id: Uuid },

    /// The cycle ended in failure
    #[serde(rename = "cycle.failed")]
    CycleFailed {
        cycle_id: Uuid,
        phase: Option<PdcaPhase>,
        error: String,
    },

    /// The cycle was stopped by an abort signal
    #[serde(rename = "cycle.aborted")]
    CycleAborted {
        cycle_id: Uuid,
        last_completed_phase: Option<PdcaPhase>,
    },

    // Phase events
    #[serde(rename = "phase.started")]
    PhaseStarted {
        cycle_id: Uuid,
        phase: PdcaPhase,
        attempt: u32,
    },

    #[serde(rename = "phase.completed")]
    PhaseCompleted { cycle_id: Uuid, phase: PdcaPhase },

    /// A phase attempt failed and will be retried
    #[serde(rename = "phase.retrying")]
    PhaseRetrying {
        cycle_id: Uuid,
        phase: PdcaPhase,
        attempt: u32,
        error: String,
    },

    // Continuous run events
    /// The team composer changed the executor bindings between cycles
    #[serde(rename = "team.recomposed")]
    TeamRecomposed {
        cycle_index: usize,
        revision: u32,
        agent_count: usize,
    },

    /// A continuous run stopped early
    #[serde(rename = "run.stopped")]
    RunStopped {
        cycles_run: usize,
        reason: String,
    },

    // Storage events
    /// Saving the cycle failed; the run carries on
    #[serde(rename = "cycle.store_failed")]
    StoreFailed { cycle_id: Uuid, error: String },
}

impl Event {
    /// Cycle the event belongs to, if any
    pub fn cycle_id(&self) -> Option<Uuid> {
        match self {
            Event::CycleStarted { cycle_id, .. }
            | Event::CycleResumed { cycle_id, .. }
            | Event::CycleCompleted { cycle_id }
            | Event::CycleFailed { cycle_id, .. }
            | Event::CycleAborted { cycle_id, .. }
            | Event::PhaseStarted { cycle_id, .. }
            | Event::PhaseCompleted { cycle_id, .. }
            | Event::PhaseRetrying { cycle_id, .. }
            | Event::StoreFailed { cycle_id, .. } => Some(*cycle_id),
            Event::TeamRecomposed { .. } | Event::RunStopped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_serialization() {
        let event = Event::PhaseStarted {
            cycle_id: Uuid::new_v4(),
            phase: PdcaPhase::Check,
            attempt: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase.started");
        assert_eq!(json["phase"], "check");
        assert_eq!(json["attempt"], 2);
    }

    #[test]
    fn test_event_cycle_id() {
        let id = Uuid::new_v4();
        assert_eq!(Event::CycleCompleted { cycle_id: id }.cycle_id(), Some(id));
        let store_failed = Event::StoreFailed {
            cycle_id: id,
            error: "disk full".to_string(),
        };
        assert_eq!(store_failed.cycle_id(), Some(id));
        assert_eq!(
            serde_json::to_value(&store_failed).unwrap()["type"],
            "cycle.store_failed"
        );
        assert_eq!(
            Event::RunStopped {
                cycles_run: 1,
                reason: "failed".to_string()
            }
            .cycle_id(),
            None
        );
    }

    #[test]
    fn test_envelope_deserialization() {
        let envelope = EventEnvelope::new(Event::CycleAborted {
            cycle_id: Uuid::new_v4(),
            last_completed_phase: Some(PdcaPhase::Do),
        });
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, envelope.id);
        assert!(matches!(
            back.event,
            Event::CycleAborted {
                last_completed_phase: Some(PdcaPhase::Do),
                ..
            }
        ));
    }
}
