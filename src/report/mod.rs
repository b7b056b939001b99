//! Result tables for the operator and for export.

use serde::Serialize;

use crate::domain::CandidateResult;

pub mod format;

pub use format::*;

/// One retained candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub parameters: Vec<f64>,
    /// Raw metric values, in `ReportTable::metric_names` order.
    pub metrics: Vec<f64>,
    /// Simulated series as returned by the simulator.
    pub series: Vec<f64>,
}

/// Ordered table of retained candidates: `{parameter…, metric…}` columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportTable {
    pub parameter_names: Vec<String>,
    pub metric_names: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Build a table, keeping the order of `results`.
    ///
    /// Column names come from the first result; every result in a batch
    /// shares them.
    pub fn from_results(results: &[CandidateResult]) -> Self {
        let Some(first) = results.first() else {
            return Self::default();
        };
        Self {
            parameter_names: first.parameters.names().iter().map(|s| s.to_string()).collect(),
            metric_names: first.metrics.names().iter().map(|s| s.to_string()).collect(),
            rows: results
                .iter()
                .map(|r| ReportRow {
                    parameters: r.parameters.values(),
                    metrics: r.metrics.values(),
                    series: r.simulated.clone(),
                })
                .collect(),
        }
    }

    pub fn headers(&self) -> Vec<&str> {
        self.parameter_names
            .iter()
            .chain(&self.metric_names)
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
pub(crate) fn sample_results() -> Vec<CandidateResult> {
    use crate::domain::{MetricVector, ParameterSet};

    let make = |n: f64, rmse: f64, r2: f64| {
        let metrics: MetricVector = [("rmse".to_string(), rmse), ("r2".to_string(), r2)]
            .into_iter()
            .collect();
        let minimized: MetricVector = [("rmse".to_string(), rmse), ("r2".to_string(), -r2)]
            .into_iter()
            .collect();
        CandidateResult {
            parameters: ParameterSet::single("n", n),
            metrics,
            minimized,
            simulated: vec![10.0 + n, 11.0 + n],
        }
    };
    vec![make(0.035, 0.123_45, 0.98), make(0.04, 0.2, 0.951_2)]
}
