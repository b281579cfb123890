use chrono::{DateTime, Utc};
use pdca_core::CycleState;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CycleRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub current_phase: String,
    pub state_json: String,
    pub previous_cycle_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CycleRow {
    /// The JSON column is authoritative; the other columns only index it.
    pub fn into_domain(self) -> Result<CycleState> {
        Ok(serde_json::from_str(&self.state_json)?)
    }

    pub fn try_from_state(state: &CycleState) -> Result<Self> {
        Ok(Self {
            id: state.id.to_string(),
            name: state.name.clone(),
            status: state.status().as_str().to_string(),
            current_phase: state.current_phase().as_str().to_string(),
            state_json: serde_json::to_string(state)?,
            previous_cycle_id: state.previous_cycle_id.map(|id| id.to_string()),
            created_at: datetime_to_timestamp(state.created_at),
            updated_at: datetime_to_timestamp(state.updated_at()),
        })
    }
}

fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
