//! JSON settings file.
//!
//! Every field is optional; command-line flags take precedence over the file
//! and built-in defaults fill whatever neither provides.
//!
//! ```json
//! {
//!   "observed": "gauge.csv",
//!   "river": "Main", "reach": "Upper", "station": "1200",
//!   "metrics": ["rmse", "pbias", "nse"],
//!   "best_by": "rmse",
//!   "simulator": { "program": "./run-model.sh", "timeout_secs": 600 },
//!   "optimizer": { "program": "./nsga2.py" }, "evaluations": 400
//! }
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::SeriesKind;
use crate::error::{CalibrationError, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub observed: Option<PathBuf>,
    pub river: Option<String>,
    pub reach: Option<String>,
    pub station: Option<String>,
    pub parameter: Option<String>,
    pub series: Option<SeriesKind>,

    pub metrics: Option<Vec<String>>,
    pub best_by: Option<String>,
    pub pareto: Option<bool>,
    pub report_count: Option<usize>,
    pub correct_datum: Option<bool>,

    pub sample_count: Option<usize>,
    pub randomized: Option<bool>,
    pub seed: Option<u64>,
    pub evaluations: Option<usize>,

    pub output: Option<PathBuf>,
    pub output_json: Option<PathBuf>,

    pub simulator: Option<SimulatorSettings>,
    pub optimizer: Option<OptimizerSettings>,
}

/// External simulator command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

/// External optimizer command for automated search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizerSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let file = File::open(path).map_err(|e| {
        CalibrationError::io(format!("Failed to open settings file '{}'", path.display()), e)
    })?;
    serde_json::from_reader(file).map_err(|e| {
        CalibrationError::configuration(format!(
            "Invalid settings file '{}': {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_parse() {
        let s: Settings = serde_json::from_str(
            r#"{"river": "Main", "metrics": ["rmse"], "series": "velocity",
                "simulator": {"program": "model.sh"}}"#,
        )
        .unwrap();
        assert_eq!(s.river.as_deref(), Some("Main"));
        assert_eq!(s.series, Some(SeriesKind::Velocity));
        assert_eq!(s.reach, None);
        let sim = s.simulator.unwrap();
        assert_eq!(sim.program, PathBuf::from("model.sh"));
        assert!(sim.args.is_empty());
        assert_eq!(s.optimizer, None);
    }

    #[test]
    fn optimizer_settings_parse() {
        let s: Settings = serde_json::from_str(
            r#"{"evaluations": 400, "optimizer": {"program": "nsga2.py", "args": ["--seed", "3"]}}"#,
        )
        .unwrap();
        assert_eq!(s.evaluations, Some(400));
        let opt = s.optimizer.unwrap();
        assert_eq!(opt.program, PathBuf::from("nsga2.py"));
        assert_eq!(opt.args, vec!["--seed".to_string(), "3".to_string()]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<Settings>(r#"{"rivr": "Main"}"#).is_err());
    }

    #[test]
    fn bad_file_is_a_configuration_error() {
        let path = std::env::temp_dir().join(format!("rcal-settings-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
