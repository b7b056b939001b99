//! Mathematical utilities: descriptive statistics and test distributions.

pub mod stats;

pub use stats::*;
