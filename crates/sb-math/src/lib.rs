//! splat-bench math utilities.

pub mod math;

pub use math::quality::*;
pub use math::stats::*;
