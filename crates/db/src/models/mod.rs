mod cycle;

pub use cycle::*;
