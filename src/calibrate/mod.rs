//! Calibration control loops.
//!
//! - `narrowing`: operator-driven bounds narrowing (a small state machine)
//! - `search`: automated multi-objective search through an external optimizer
//! - `external`: an optimizer running as a child process
//!
//! Both produce the same ordered `CandidateResult` list.

use crate::domain::{CalibrationConfig, CandidateResult};
use crate::error::{CalibrationError, Result};
use crate::eval::{Evaluator, SelectionCriteria};
use crate::sim::{SimulationOutput, SimulationPlan};

pub mod external;
pub mod narrowing;
pub mod search;

pub use external::ProcessOptimizer;
pub use narrowing::*;
pub use search::*;

/// Plan reading the configured station once per observed profile.
pub fn plan_for(config: &CalibrationConfig, evaluator: &Evaluator) -> SimulationPlan {
    SimulationPlan::single(
        config.parameter_name.clone(),
        config.location.clone(),
        config.station.clone(),
        config.series_kind,
        evaluator.observed().len(),
    )
}

/// Selection settings for a batch of `candidates`.
pub fn criteria_for(
    config: &CalibrationConfig,
    evaluator: &Evaluator,
    candidates: usize,
) -> SelectionCriteria {
    SelectionCriteria {
        metrics: evaluator.metric_names().to_vec(),
        best_by: config.best_by.clone(),
        use_pareto: config.use_pareto,
        n: config.report_count_for(candidates),
    }
}

/// Score simulation outputs in order against the observed series.
pub fn score_outputs(
    evaluator: &Evaluator,
    station: &str,
    outputs: Vec<SimulationOutput>,
) -> Result<Vec<CandidateResult>> {
    outputs
        .into_iter()
        .map(|output| score_output(evaluator, station, output))
        .collect()
}

fn score_output(
    evaluator: &Evaluator,
    station: &str,
    mut output: SimulationOutput,
) -> Result<CandidateResult> {
    let series = output.series.remove(station).ok_or_else(|| {
        CalibrationError::configuration(format!(
            "No series was retrieved for station '{station}' (candidate [{}]).",
            output.parameters
        ))
    })?;
    evaluator.score(output.parameters, series)
}
