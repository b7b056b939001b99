//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - installs logging
//! - parses CLI arguments and merges them with the optional settings file
//! - runs the requested command
//! - writes optional exports

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::calibrate::{Bounds, NarrowingSession, ProcessOptimizer, ReportSink, automated_search};
use crate::cli::console::ConsoleOperator;
use crate::cli::{AutoArgs, Cli, Command, EvalArgs, NarrowArgs, RunArgs, ScoreArgs, ShowArgs};
use crate::domain::{CalibrationConfig, CandidateResult, Location, ParameterSet, SeriesKind};
use crate::error::{CalibrationError, Result};
use crate::eval::{Evaluator, EvaluatorConfig};
use crate::io::{
    ObservedData, ResultsFile, RunMode, Settings, load_observed, load_settings, read_results_json,
    series_path_for, write_results_json, write_series_csv, write_table_csv,
};
use crate::metrics::MetricRegistry;
use crate::report::{ReportTable, format_table};
use crate::sim::{CommandRunner, WHOLE_REACH};

pub const DEFAULT_PARAMETER: &str = "n";
pub const DEFAULT_SAMPLE_COUNT: usize = 10;
pub const DEFAULT_EVALUATIONS: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Entry point for the `rcal` binary.
pub fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Narrow(args) => handle_narrow(&args),
        Command::Auto(args) => handle_auto(&args),
        Command::Score(args) => handle_score(&args),
        Command::Show(args) => handle_show(&args),
        Command::Metrics => {
            for name in MetricRegistry::standard().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries the tables.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "roughness_cal=info".into());
    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn handle_narrow(args: &NarrowArgs) -> Result<()> {
    let settings = settings_for(&args.run.eval)?;
    let config = narrow_config(args, &settings)?;
    let observed = load_observed(&observed_path(&args.run.eval, &settings)?)?;
    let evaluator = build_evaluator(&observed, &config)?;
    let runner = command_runner(&args.run, &settings)?;

    let initial = match (args.min, args.max) {
        (Some(min), Some(max)) => Some(Bounds::new(min, max, config.sample_count)),
        _ => None,
    };
    let mut operator = ConsoleOperator::stdio(initial, config.sample_count);
    let mut sink = ExportReport {
        mode: RunMode::Narrowing,
        config: config.clone(),
        metrics: evaluator.metric_names().to_vec(),
        observed,
    };

    info!(
        "calibrating {} at {}, station {}",
        config.parameter_name, config.location, config.station
    );
    let mut session = NarrowingSession::new(config, evaluator, runner)?;
    let retained = session.run(&mut operator, &mut sink)?;
    info!(
        "narrowing finished after {} iteration(s) with {} candidate(s)",
        session.iteration(),
        retained.len()
    );
    Ok(())
}

fn handle_auto(args: &AutoArgs) -> Result<()> {
    let settings = settings_for(&args.run.eval)?;
    let config = auto_config(args, &settings)?;
    let observed = load_observed(&observed_path(&args.run.eval, &settings)?)?;
    let evaluator = build_evaluator(&observed, &config)?;
    let runner = command_runner(&args.run, &settings)?;

    let optimizer = settings.optimizer.as_ref();
    let program = args
        .optimizer
        .clone()
        .or_else(|| optimizer.map(|o| o.program.clone()))
        .ok_or_else(|| {
            CalibrationError::configuration(
                "No optimizer command given (use --optimizer or the settings file).",
            )
        })?;
    let optimizer_args = if args.optimizer_args.is_empty() {
        optimizer.map(|o| o.args.clone()).unwrap_or_default()
    } else {
        args.optimizer_args.clone()
    };
    let mut optimizer = ProcessOptimizer::new(program, optimizer_args);

    info!(
        population = config.sample_count,
        evaluations = config.evaluations,
        "searching {} at {}, station {}",
        config.parameter_name,
        config.location,
        config.station
    );
    let results = automated_search(&config, &evaluator, runner, &mut optimizer)?;
    print!("{}", format_table(&ReportTable::from_results(&results)));

    let mut sink = ExportReport {
        mode: RunMode::AutomatedSearch,
        metrics: evaluator.metric_names().to_vec(),
        config,
        observed,
    };
    sink.finish(&results)
}

fn handle_score(args: &ScoreArgs) -> Result<()> {
    let settings = settings_for(&args.eval)?;
    let observed = load_observed(&observed_path(&args.eval, &settings)?)?;
    let simulated = load_observed(&args.simulated)?;
    let correct_datum = correct_datum(&args.eval, settings.correct_datum);

    let evaluator = Evaluator::new(
        MetricRegistry::standard(),
        EvaluatorConfig {
            observed: observed.stages.clone(),
            metrics: args.eval.metrics.clone().or(settings.metrics),
            correct_datum,
        },
    )?;
    let result = evaluator.score(ParameterSet::new(), simulated.stages)?;
    let results = [result];
    print!("{}", format_table(&ReportTable::from_results(&results)));

    if let Some(path) = &args.output_json {
        let file = ResultsFile::scored(
            evaluator.metric_names(),
            correct_datum,
            &observed.stages,
            &results,
        );
        write_results_json(path, &file)?;
    }
    Ok(())
}

fn handle_show(args: &ShowArgs) -> Result<()> {
    let file = read_results_json(&args.results)?;
    print!("{}", describe_results(&file));
    Ok(())
}

/// Header line plus the candidate table of a stored run.
pub fn describe_results(file: &ResultsFile) -> String {
    let mut out = format!(
        "{:?} run from {} ({} {})",
        file.mode,
        file.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        file.tool,
        file.version
    );
    if let (Some(location), Some(station)) = (&file.location, &file.station) {
        out.push_str(&format!(", {location} station {station}"));
    }
    out.push_str(&format!("\n{} candidate(s)\n", file.candidates.len()));
    out.push_str(&format_table(&ReportTable::from_results(&file.candidates)));
    out
}

fn command_runner(args: &RunArgs, settings: &Settings) -> Result<CommandRunner> {
    let simulator = settings.simulator.as_ref();
    let program = args
        .simulator
        .clone()
        .or_else(|| simulator.map(|s| s.program.clone()))
        .ok_or_else(|| {
            CalibrationError::configuration(
                "No simulator command given (use --simulator or the settings file).",
            )
        })?;
    let sim_args = if args.sim_args.is_empty() {
        simulator.map(|s| s.args.clone()).unwrap_or_default()
    } else {
        args.sim_args.clone()
    };
    let timeout = args
        .timeout_secs
        .or_else(|| simulator.and_then(|s| s.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok(CommandRunner::new(program, sim_args, Duration::from_secs(timeout)))
}

fn settings_for(args: &EvalArgs) -> Result<Settings> {
    match &args.config {
        Some(path) => load_settings(path),
        None => Ok(Settings::default()),
    }
}

fn observed_path(args: &EvalArgs, settings: &Settings) -> Result<std::path::PathBuf> {
    args.observed
        .clone()
        .or_else(|| settings.observed.clone())
        .ok_or_else(|| {
            CalibrationError::configuration(
                "No observed data given (use --observed or the settings file).",
            )
        })
}

fn correct_datum(args: &EvalArgs, from_settings: Option<bool>) -> bool {
    !args.no_datum && from_settings.unwrap_or(true)
}

/// Merge flags over settings over defaults.
pub fn run_config(args: &RunArgs, settings: &Settings) -> Result<CalibrationConfig> {
    let river = args
        .river
        .clone()
        .or_else(|| settings.river.clone())
        .ok_or_else(|| CalibrationError::configuration("No river given (use --river)."))?;
    let reach = args
        .reach
        .clone()
        .or_else(|| settings.reach.clone())
        .unwrap_or_else(|| WHOLE_REACH.to_string());
    let station = args
        .station
        .clone()
        .or_else(|| settings.station.clone())
        .ok_or_else(|| CalibrationError::configuration("No river station given (use --station)."))?;

    Ok(CalibrationConfig {
        location: Location::new(river, reach),
        station,
        parameter_name: args
            .parameter
            .clone()
            .or_else(|| settings.parameter.clone())
            .unwrap_or_else(|| DEFAULT_PARAMETER.to_string()),
        series_kind: args.series.or(settings.series).unwrap_or(SeriesKind::Stage),
        sample_count: args
            .count
            .or(settings.sample_count)
            .unwrap_or(DEFAULT_SAMPLE_COUNT),
        randomized: settings.randomized.unwrap_or(false),
        seed: settings.seed,
        metrics: args.eval.metrics.clone().or_else(|| settings.metrics.clone()),
        best_by: args.best_by.clone().or_else(|| settings.best_by.clone()),
        use_pareto: !args.no_pareto && settings.pareto.unwrap_or(true),
        report_count: args.report_count.or(settings.report_count),
        correct_datum: correct_datum(&args.eval, settings.correct_datum),
        evaluations: settings.evaluations.unwrap_or(DEFAULT_EVALUATIONS),
        output: args.output.clone().or_else(|| settings.output.clone()),
        output_json: args.output_json.clone().or_else(|| settings.output_json.clone()),
    })
}

pub fn narrow_config(args: &NarrowArgs, settings: &Settings) -> Result<CalibrationConfig> {
    let mut config = run_config(&args.run, settings)?;
    config.randomized |= args.randomized;
    config.seed = args.seed.or(config.seed);
    Ok(config)
}

pub fn auto_config(args: &AutoArgs, settings: &Settings) -> Result<CalibrationConfig> {
    let mut config = run_config(&args.run, settings)?;
    if let Some(evaluations) = args.evaluations {
        config.evaluations = evaluations;
    }
    Ok(config)
}

fn build_evaluator(observed: &ObservedData, config: &CalibrationConfig) -> Result<Evaluator> {
    Evaluator::new(
        MetricRegistry::standard(),
        EvaluatorConfig {
            observed: observed.stages.clone(),
            metrics: config.metrics.clone(),
            correct_datum: config.correct_datum,
        },
    )
}

/// Writes the final retained batch to whichever outputs are configured.
pub struct ExportReport {
    pub mode: RunMode,
    pub config: CalibrationConfig,
    pub metrics: Vec<String>,
    pub observed: ObservedData,
}

impl ReportSink for ExportReport {
    fn finish(&mut self, results: &[CandidateResult]) -> Result<()> {
        let table = ReportTable::from_results(results);
        if let Some(path) = &self.config.output {
            write_table_csv(path, &table)?;
            write_series_csv(&series_path_for(path), &self.observed, &table)?;
        }
        if let Some(path) = &self.config.output_json {
            write_json(path, self, results)?;
        }
        Ok(())
    }
}

fn write_json(path: &Path, report: &ExportReport, results: &[CandidateResult]) -> Result<()> {
    let file = ResultsFile::new(
        report.mode,
        &report.config,
        &report.metrics,
        &report.observed.stages,
        results,
    );
    write_results_json(path, &file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimulatorSettings;

    fn run_args() -> RunArgs {
        RunArgs {
            river: Some("Main".to_string()),
            station: Some("1200".to_string()),
            ..RunArgs::default()
        }
    }

    fn args() -> NarrowArgs {
        NarrowArgs {
            run: run_args(),
            ..NarrowArgs::default()
        }
    }

    #[test]
    fn defaults_fill_what_flags_and_settings_leave_out() {
        let cfg = narrow_config(&args(), &Settings::default()).unwrap();
        assert_eq!(cfg.location, Location::new("Main", WHOLE_REACH));
        assert_eq!(cfg.parameter_name, "n");
        assert_eq!(cfg.series_kind, SeriesKind::Stage);
        assert_eq!(cfg.sample_count, DEFAULT_SAMPLE_COUNT);
        assert!(cfg.use_pareto);
        assert!(cfg.correct_datum);
        assert_eq!(cfg.metrics, None);
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings {
            river: Some("Other".to_string()),
            reach: Some("Upper".to_string()),
            sample_count: Some(4),
            best_by: Some("nse".to_string()),
            pareto: Some(true),
            correct_datum: Some(true),
            simulator: Some(SimulatorSettings {
                program: "model.sh".into(),
                args: Vec::new(),
                timeout_secs: None,
            }),
            ..Settings::default()
        };
        let mut a = args();
        a.run.count = Some(12);
        a.run.no_pareto = true;
        a.run.eval.no_datum = true;

        let cfg = narrow_config(&a, &settings).unwrap();
        assert_eq!(cfg.location, Location::new("Main", "Upper"));
        assert_eq!(cfg.sample_count, 12);
        assert_eq!(cfg.best_by.as_deref(), Some("nse"));
        assert!(!cfg.use_pareto);
        assert!(!cfg.correct_datum);
    }

    #[test]
    fn settings_can_switch_features_off() {
        let settings = Settings {
            pareto: Some(false),
            correct_datum: Some(false),
            ..Settings::default()
        };
        let cfg = narrow_config(&args(), &settings).unwrap();
        assert!(!cfg.use_pareto);
        assert!(!cfg.correct_datum);
    }

    #[test]
    fn river_and_station_are_required() {
        let mut a = args();
        a.run.station = None;
        assert_eq!(
            narrow_config(&a, &Settings::default()).unwrap_err().exit_code(),
            2
        );
        assert!(narrow_config(&NarrowArgs::default(), &Settings::default()).is_err());
    }

    #[test]
    fn missing_observed_path_is_a_configuration_error() {
        let err = observed_path(&EvalArgs::default(), &Settings::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn narrow_flags_and_settings_merge_randomization() {
        let settings = Settings {
            seed: Some(1),
            ..Settings::default()
        };
        let mut a = args();
        a.randomized = true;
        let cfg = narrow_config(&a, &settings).unwrap();
        assert!(cfg.randomized);
        assert_eq!(cfg.seed, Some(1));

        a.seed = Some(9);
        assert_eq!(narrow_config(&a, &settings).unwrap().seed, Some(9));
    }

    #[test]
    fn auto_evaluations_come_from_flags_then_settings() {
        let mut a = AutoArgs {
            run: run_args(),
            ..AutoArgs::default()
        };
        let cfg = auto_config(&a, &Settings::default()).unwrap();
        assert_eq!(cfg.evaluations, DEFAULT_EVALUATIONS);

        let settings = Settings {
            evaluations: Some(250),
            ..Settings::default()
        };
        assert_eq!(auto_config(&a, &settings).unwrap().evaluations, 250);

        a.evaluations = Some(40);
        assert_eq!(auto_config(&a, &settings).unwrap().evaluations, 40);
    }

    #[test]
    fn missing_simulator_is_a_configuration_error() {
        let err = command_runner(&run_args(), &Settings::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("--simulator"), "{err}");
    }

    #[test]
    fn stored_results_are_described_with_their_location() {
        let config = auto_config(
            &AutoArgs {
                run: run_args(),
                ..AutoArgs::default()
            },
            &Settings::default(),
        )
        .unwrap();
        let candidate = CandidateResult {
            parameters: ParameterSet::single("n", 0.035),
            metrics: [("rmse".to_string(), 0.25)].into_iter().collect(),
            minimized: [("rmse".to_string(), 0.25)].into_iter().collect(),
            simulated: vec![1.0, 2.0],
        };
        let file = ResultsFile::new(
            RunMode::AutomatedSearch,
            &config,
            &["rmse".to_string()],
            &[1.0, 2.0],
            &[candidate],
        );
        let text = describe_results(&file);
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("AutomatedSearch run from "), "{first}");
        assert!(first.contains("station 1200"), "{first}");
        assert!(text.contains("1 candidate(s)"));
        assert!(text.contains("0.035"));
    }
}
