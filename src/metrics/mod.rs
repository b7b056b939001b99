//! Metric library: scoring functions and the registry that names them.

pub mod library;
pub mod registry;

pub use library::*;
pub use registry::*;
