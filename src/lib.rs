//! `roughness-cal` library crate.
//!
//! Calibrates a hydraulic model's roughness coefficient against observed
//! stages: generate candidate values, simulate each one, score the simulated
//! series with a set of goodness-of-fit metrics, and keep the candidates no
//! other candidate beats on every metric.
//!
//! The binary (`rcal`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the simulator and the optimizer stay pluggable behind traits

pub mod app;
pub mod calibrate;
pub mod cli;
pub mod domain;
pub mod error;
pub mod eval;
pub mod io;
pub mod math;
pub mod metrics;
pub mod params;
pub mod report;
pub mod sim;
