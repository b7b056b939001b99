//! Input/output helpers.
//!
//! - observed CSV ingest + validation (`ingest`)
//! - table and series exports to CSV (`export`)
//! - results JSON read/write (`results`)
//! - JSON settings file (`settings`)

pub mod export;
pub mod ingest;
pub mod results;
pub mod settings;

pub use export::*;
pub use ingest::*;
pub use results::*;
pub use settings::*;
