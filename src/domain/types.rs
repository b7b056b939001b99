//! Shared domain types.
//!
//! These are kept small and serializable so they can be:
//!
//! - passed between the sampler, the simulation runner and the evaluator
//! - exported to JSON/CSV at the end of a run

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, Result};

/// Bounds and sampling mode for one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub randomized: bool,
}

impl ParameterSpec {
    /// Evenly spaced spec over `[min, max]`.
    pub fn new(name: impl Into<String>, min: f64, max: f64, count: usize) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            count,
            randomized: false,
        }
    }

    pub fn randomized(mut self, randomized: bool) -> Self {
        self.randomized = randomized;
        self
    }

    /// Reject malformed bounds before anything is simulated.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CalibrationError::configuration("Parameter name must not be empty."));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(CalibrationError::configuration(format!(
                "Invalid bounds for '{}': min={}, max={} (must be finite and min<max).",
                self.name, self.min, self.max
            )));
        }
        if !self.randomized && self.count < 2 {
            return Err(CalibrationError::configuration(format!(
                "Parameter '{}' needs at least 2 evenly spaced values, got {}.",
                self.name, self.count
            )));
        }
        if self.randomized && self.count == 0 {
            return Err(CalibrationError::configuration(format!(
                "Parameter '{}' needs at least 1 random value.",
                self.name
            )));
        }
        Ok(())
    }
}

/// Ordered `name -> value` mapping for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    values: Vec<(String, f64)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, value: f64) -> Self {
        Self {
            values: vec![(name.into(), value)],
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy with every value rounded to `places` decimals.
    pub fn rounded(&self, places: i32) -> Self {
        let scale = 10f64.powi(places);
        Self {
            values: self
                .values
                .iter()
                .map(|(n, v)| (n.clone(), (v * scale).round() / scale))
                .collect(),
        }
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Ordered `metric name -> score` mapping.
///
/// Every candidate in a batch carries the same keys in the same order; the
/// dominance filter compares vectors position by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMetrics", into = "StoredMetrics")]
pub struct MetricVector {
    entries: Vec<(String, f64)>,
}

/// Serialized form: NaN scores become `null`.
#[derive(Serialize, Deserialize)]
struct StoredMetrics {
    entries: Vec<(String, Option<f64>)>,
}

impl From<MetricVector> for StoredMetrics {
    fn from(v: MetricVector) -> Self {
        Self {
            entries: v
                .entries
                .into_iter()
                .map(|(n, x)| (n, (!x.is_nan()).then_some(x)))
                .collect(),
        }
    }
}

impl From<StoredMetrics> for MetricVector {
    fn from(s: StoredMetrics) -> Self {
        Self {
            entries: s
                .entries
                .into_iter()
                .map(|(n, x)| (n, x.unwrap_or(f64::NAN)))
                .collect(),
        }
    }
}

impl MetricVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, f64)> for MetricVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One scored candidate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub parameters: ParameterSet,
    /// Metric values as computed (human-readable).
    pub metrics: MetricVector,
    /// Same metrics transformed so lower is always better.
    pub minimized: MetricVector,
    /// Simulated series as returned by the runner (before datum correction).
    pub simulated: Vec<f64>,
}

/// A river/reach pair addressed in the hydraulic model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub river: String,
    pub reach: String,
}

impl Location {
    pub fn new(river: impl Into<String>, reach: impl Into<String>) -> Self {
        Self {
            river: river.into(),
            reach: reach.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.river, self.reach)
    }
}

/// Which output series to pull from a finished simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    /// Water-surface elevation.
    Stage,
    Velocity,
}

impl SeriesKind {
    pub fn column(self) -> &'static str {
        match self {
            SeriesKind::Stage => "stage",
            SeriesKind::Velocity => "velocity",
        }
    }
}

/// A calibration run's configuration as understood by the controller.
///
/// Derived from CLI flags and the optional settings file.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Reach whose roughness is calibrated.
    pub location: Location,
    /// River station whose series is compared to the observations.
    pub station: String,
    pub parameter_name: String,
    pub series_kind: SeriesKind,

    /// Candidates per narrowing iteration (population size in automated search).
    pub sample_count: usize,
    pub randomized: bool,
    pub seed: Option<u64>,

    /// Requested metrics, or `None` for the whole registry.
    pub metrics: Option<Vec<String>>,
    /// Rank the reported set by this metric.
    pub best_by: Option<String>,
    pub use_pareto: bool,
    /// Rows to report; defaults to a fifth of the candidates.
    pub report_count: Option<usize>,
    pub correct_datum: bool,

    /// Evaluation budget for automated search.
    pub evaluations: usize,

    pub output: Option<PathBuf>,
    pub output_json: Option<PathBuf>,
}

impl CalibrationConfig {
    /// Rows reported for a batch of `candidates`.
    pub fn report_count_for(&self, candidates: usize) -> usize {
        self.report_count.unwrap_or(candidates / 5).max(1)
    }
}
