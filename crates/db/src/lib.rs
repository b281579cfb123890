//! SQLite persistence for PDCA cycles.
//!
//! Each cycle is stored as one row keyed by its id, with the full
//! `CycleState` serialised in `state_json` and a few columns lifted out for
//! filtering.

mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::CycleRow;
pub use pool::*;
pub use repositories::*;
