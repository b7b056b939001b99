//! Command-line parsing for the roughness calibrator.
//!
//! Argument parsing and command dispatch stay separate from the calibration
//! engine. Every option that can also come from the settings file is an
//! `Option` here so the merge in `app` can tell "not given" from a default.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::SeriesKind;

pub mod console;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "rcal",
    version,
    about = "Roughness coefficient calibration against observed stage data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Narrow the roughness interactively: propose bounds, inspect the best candidates, repeat.
    Narrow(NarrowArgs),
    /// Search the roughness automatically with an external multi-objective optimizer.
    Auto(AutoArgs),
    /// Score an already simulated series against the observations.
    Score(ScoreArgs),
    /// Print the candidates stored in a results JSON file.
    Show(ShowArgs),
    /// List the available metrics.
    Metrics,
}

/// Options shared by every command that evaluates series.
#[derive(Debug, Args, Clone, Default)]
pub struct EvalArgs {
    /// JSON settings file; flags override its values.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Observed CSV with `Flow` and `Stage` columns, one row per profile.
    #[arg(short = 'f', long, value_name = "CSV")]
    pub observed: Option<PathBuf>,

    /// Metrics to compute (comma-separated). Defaults to all.
    #[arg(short = 'm', long, value_delimiter = ',')]
    pub metrics: Option<Vec<String>>,

    /// Compare raw stages without aligning the low-flow datum.
    #[arg(long)]
    pub no_datum: bool,
}

/// Model, selection and output options shared by the calibration commands.
#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub eval: EvalArgs,

    /// River whose roughness is calibrated.
    #[arg(long)]
    pub river: Option<String>,

    #[arg(long)]
    pub reach: Option<String>,

    /// River station compared to the observations.
    #[arg(long)]
    pub station: Option<String>,

    /// Parameter name used in reports.
    #[arg(long)]
    pub parameter: Option<String>,

    /// Simulated series to compare.
    #[arg(long, value_enum)]
    pub series: Option<SeriesKind>,

    /// Rank retained candidates by this metric.
    #[arg(long)]
    pub best_by: Option<String>,

    /// Skip the dominance filter (requires --best-by with several metrics).
    #[arg(long)]
    pub no_pareto: bool,

    /// Rows to report per iteration (default: a fifth of the candidates).
    #[arg(long)]
    pub report_count: Option<usize>,

    /// Candidates per iteration, or the optimizer's population size.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Simulator command, run once per candidate.
    #[arg(long, value_name = "PROGRAM")]
    pub simulator: Option<PathBuf>,

    /// Extra argument for the simulator command (repeatable).
    #[arg(long = "sim-arg", allow_hyphen_values = true)]
    pub sim_args: Vec<String>,

    /// Seconds before a simulation is killed.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Write the final table to CSV (plus a `-data` series companion).
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Write the final results, including series, to JSON.
    #[arg(long, value_name = "JSON")]
    pub output_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct NarrowArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Draw candidates uniformly at random instead of evenly spaced.
    #[arg(long)]
    pub randomized: bool,

    /// Seed for randomized candidates.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Lower bound for the first iteration (skips the first prompt with --max).
    #[arg(long, requires = "max")]
    pub min: Option<f64>,

    /// Upper bound for the first iteration.
    #[arg(long, requires = "min")]
    pub max: Option<f64>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct AutoArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Optimizer command speaking the line-delimited JSON protocol.
    #[arg(long, value_name = "PROGRAM")]
    pub optimizer: Option<PathBuf>,

    /// Extra argument for the optimizer command (repeatable).
    #[arg(long = "optimizer-arg", allow_hyphen_values = true)]
    pub optimizer_args: Vec<String>,

    /// Objective evaluations the optimizer may spend.
    #[arg(short = 'e', long)]
    pub evaluations: Option<usize>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub eval: EvalArgs,

    /// Simulated CSV in the same `Flow`/`Stage` layout as the observations.
    #[arg(short = 's', long, value_name = "CSV")]
    pub simulated: PathBuf,

    /// Write the scores and both series to JSON.
    #[arg(long, value_name = "JSON")]
    pub output_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Results JSON written by `narrow`, `auto` or `score`.
    #[arg(value_name = "JSON")]
    pub results: PathBuf,
}
