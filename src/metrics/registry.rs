//! Name-keyed metric registry.
//!
//! The registry is an explicit value handed to the evaluator and the dominance
//! filter, so callers can swap in custom metrics (or a reduced set) without
//! touching global state. Registration order is the order used when "all
//! metrics" are requested.

use crate::error::{CalibrationError, Result};
use crate::metrics::library;

/// Scoring function: `(simulated, observed) -> score`.
pub type ScoreFn = fn(&[f64], &[f64]) -> Result<f64>;
/// Transform making lower scores better.
pub type MinimizeFn = fn(f64) -> f64;

#[derive(Debug, Clone)]
pub struct MetricDef {
    pub name: String,
    pub score: ScoreFn,
    pub minimize: MinimizeFn,
}

#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    defs: Vec<MetricDef>,
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The eight standard metrics.
    pub fn standard() -> Self {
        let mut reg = Self::empty();
        let builtin: [(&str, ScoreFn, MinimizeFn); 8] = [
            ("r2", library::r_squared, library::negate),
            ("pbias", library::percent_bias, library::absolute),
            ("rmse", library::rmse, library::identity),
            ("ks_pval", library::ks_pval, library::negate),
            ("ks_stat", library::ks_stat, library::identity),
            ("paired", library::paired, library::negate),
            ("mae", library::mae, library::identity),
            ("nse", library::nse, library::negate),
        ];
        for (name, score, minimize) in builtin {
            reg.defs.push(MetricDef {
                name: name.to_string(),
                score,
                minimize,
            });
        }
        reg
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        score: ScoreFn,
        minimize: MinimizeFn,
    ) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(CalibrationError::configuration(format!(
                "Metric '{name}' is already registered."
            )));
        }
        self.defs.push(MetricDef {
            name,
            score,
            minimize,
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.iter().any(|d| d.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&MetricDef> {
        self.defs.iter().find(|d| d.name == name).ok_or_else(|| {
            CalibrationError::configuration(format!(
                "Unknown metric '{name}'. Available: {}.",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.defs.iter().map(|d| d.name.as_str()).collect()
    }

    /// Resolve a request to definitions, in request order (`None` = all).
    pub fn resolve(&self, requested: Option<&[String]>) -> Result<Vec<&MetricDef>> {
        let Some(requested) = requested else {
            if self.defs.is_empty() {
                return Err(CalibrationError::configuration("Metric registry is empty."));
            }
            return Ok(self.defs.iter().collect());
        };

        if requested.is_empty() {
            return Err(CalibrationError::configuration("No metrics requested."));
        }
        let mut out = Vec::with_capacity(requested.len());
        for (i, name) in requested.iter().enumerate() {
            if requested[..i].contains(name) {
                return Err(CalibrationError::configuration(format!(
                    "Metric '{name}' requested twice."
                )));
            }
            out.push(self.get(name)?);
        }
        Ok(out)
    }

    /// Names a request resolves to, in order.
    pub fn resolve_names(&self, requested: Option<&[String]>) -> Result<Vec<String>> {
        Ok(self
            .resolve(requested)?
            .into_iter()
            .map(|d| d.name.clone())
            .collect())
    }
}
