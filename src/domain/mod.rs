//! Domain types used throughout the calibration engine.
//!
//! This module defines:
//!
//! - parameter bounds and candidate values (`ParameterSpec`, `ParameterSet`)
//! - scored outputs (`MetricVector`, `CandidateResult`)
//! - model addressing (`Location`, `SeriesKind`) and the run configuration

pub mod types;

pub use types::*;
