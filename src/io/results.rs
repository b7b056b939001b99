//! Read/write results JSON files.
//!
//! The JSON file is the complete record of one calibration batch: run
//! settings, the observed series and every retained candidate with raw and
//! minimized metrics and its simulated series.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CalibrationConfig, CandidateResult, Location, SeriesKind};
use crate::error::{CalibrationError, Result};

/// How the candidates were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Narrowing,
    AutomatedSearch,
    Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    /// Model addressing; absent for scored series that never went through a simulator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesKind>,
    pub metrics: Vec<String>,
    pub correct_datum: bool,
    pub observed: Vec<f64>,
    pub candidates: Vec<CandidateResult>,
}

impl ResultsFile {
    pub fn new(
        mode: RunMode,
        config: &CalibrationConfig,
        metrics: &[String],
        observed: &[f64],
        candidates: &[CandidateResult],
    ) -> Self {
        Self {
            tool: "rcal".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            mode,
            location: Some(config.location.clone()),
            station: Some(config.station.clone()),
            series: Some(config.series_kind),
            metrics: metrics.to_vec(),
            correct_datum: config.correct_datum,
            observed: observed.to_vec(),
            candidates: candidates.to_vec(),
        }
    }

    /// Record of `rcal score`: one series scored without a model run.
    pub fn scored(
        metrics: &[String],
        correct_datum: bool,
        observed: &[f64],
        candidates: &[CandidateResult],
    ) -> Self {
        Self {
            tool: "rcal".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            mode: RunMode::Score,
            location: None,
            station: None,
            series: None,
            metrics: metrics.to_vec(),
            correct_datum,
            observed: observed.to_vec(),
            candidates: candidates.to_vec(),
        }
    }
}

pub fn write_results_json(path: &Path, results: &ResultsFile) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        CalibrationError::io(format!("Failed to create results JSON '{}'", path.display()), e)
    })?;
    serde_json::to_writer_pretty(file, results).map_err(|e| {
        CalibrationError::io(
            format!("Failed to write results JSON '{}'", path.display()),
            e.into(),
        )
    })
}

pub fn read_results_json(path: &Path) -> Result<ResultsFile> {
    let file = File::open(path).map_err(|e| {
        CalibrationError::io(format!("Failed to open results JSON '{}'", path.display()), e)
    })?;
    serde_json::from_reader(file)
        .map_err(|e| CalibrationError::configuration(format!("Invalid results JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::sample_results;
    use approx::assert_relative_eq;

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            location: Location::new("Main", "Upper"),
            station: "1200".to_string(),
            parameter_name: "n".to_string(),
            series_kind: SeriesKind::Stage,
            sample_count: 10,
            randomized: false,
            seed: None,
            metrics: None,
            best_by: None,
            use_pareto: true,
            report_count: None,
            correct_datum: true,
            evaluations: 100,
            output: None,
            output_json: None,
        }
    }

    #[test]
    fn results_survive_a_file_round_trip() {
        let path = std::env::temp_dir().join(format!("rcal-results-{}.json", std::process::id()));
        let metrics = vec!["rmse".to_string(), "r2".to_string()];
        let file = ResultsFile::new(
            RunMode::Narrowing,
            &config(),
            &metrics,
            &[10.0, 11.0],
            &sample_results(),
        );
        write_results_json(&path, &file).unwrap();
        let back = read_results_json(&path).unwrap();
        assert_eq!(back.mode, RunMode::Narrowing);
        assert_eq!(back.generated_at, file.generated_at);
        assert_eq!(back.metrics, metrics);
        assert_eq!(back.candidates.len(), 2);
        assert_eq!(back.candidates[1].parameters.names(), vec!["n"]);
        assert_relative_eq!(back.candidates[0].metrics.get("rmse").unwrap(), 0.123_45);
        assert_relative_eq!(back.candidates[0].minimized.get("r2").unwrap(), -0.98);

        assert_eq!(back.location, Some(Location::new("Main", "Upper")));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"mode\": \"narrowing\""));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn scored_results_keep_nan_metrics() {
        let path = std::env::temp_dir().join(format!("rcal-scored-{}.json", std::process::id()));
        let mut results = sample_results();
        results.truncate(1);
        results[0].metrics = [("r2".to_string(), f64::NAN), ("rmse".to_string(), 0.5)]
            .into_iter()
            .collect();
        let metrics = vec!["r2".to_string(), "rmse".to_string()];
        let file = ResultsFile::scored(&metrics, false, &[10.0, 11.0], &results);
        write_results_json(&path, &file).unwrap();

        let back = read_results_json(&path).unwrap();
        assert_eq!(back.mode, RunMode::Score);
        assert_eq!(back.location, None);
        assert!(back.candidates[0].metrics.get("r2").unwrap().is_nan());
        assert_eq!(back.candidates[0].metrics.get("rmse"), Some(0.5));
        let _ = std::fs::remove_file(&path);
    }
}
