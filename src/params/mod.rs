//! Parameter-space sampling.
//!
//! Generates ordered or randomized candidate values for one or more named
//! parameters and combines them into candidate `ParameterSet`s.

pub mod space;

pub use space::*;
