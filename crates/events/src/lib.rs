//! Event system for PDCA cycle orchestration
//!
//! This crate provides the event bus and the lifecycle events published
//! while cycles run, so observers can follow progress without touching
//! cycle state.

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::*;
