mod cycle_repository;

pub use cycle_repository::*;
