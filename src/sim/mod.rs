//! Simulation runner interface and adapters.
//!
//! - `runner`: the `SimulationRunner` trait and the sequential batch driver
//! - `command`: an adapter that runs an external command per simulation

pub mod command;
pub mod runner;

pub use command::CommandRunner;
pub use runner::*;
