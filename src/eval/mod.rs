//! Scoring and selection of calibration candidates.

pub mod dominance;
pub mod evaluator;

pub use dominance::*;
pub use evaluator::*;
