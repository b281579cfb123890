mod cycle;
mod phase;
mod results;
mod team;

pub use cycle::*;
pub use phase::*;
pub use results::*;
pub use team::*;
