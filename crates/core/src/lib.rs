//! Domain model for PDCA (Plan-Do-Check-Act) improvement cycles.
//!
//! This crate holds the typed records produced by each phase, the
//! aggregate [`CycleState`] and the team configuration records handed to
//! the agent engine. It performs no I/O.

pub mod domain;
mod error;

pub use domain::*;
pub use error::{CoreError, Result};
