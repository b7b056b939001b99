//! Driving a hydraulic simulator one candidate at a time.
//!
//! The simulator itself is external. [`SimulationRunner`] is the narrow surface
//! the calibrator needs from it; [`Simulator`] applies each candidate's
//! parameters to their bound locations, blocks on the run and collects the
//! requested series. Candidates are never dispatched concurrently: a live
//! model instance is not assumed to be re-entrant.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Location, ParameterSet, SeriesKind};
use crate::error::{CalibrationError, Result};
use crate::params::TRANSMIT_DECIMALS;

/// Key used in [`SimulationOutput::series`] when the whole reach is retrieved.
pub const WHOLE_REACH: &str = "*";

/// Failure reported by a runner. Wrapped with candidate context by [`Simulator`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("simulator exited unsuccessfully: {0}")]
    Failed(String),

    #[error("simulation did not finish within {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("malformed simulator output: {0}")]
    MalformedOutput(String),

    #[error("no {kind} series for station {station} at {location}")]
    MissingSeries {
        location: String,
        station: String,
        kind: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

/// What the calibrator needs from a hydraulic simulator.
pub trait SimulationRunner {
    /// Set the roughness for a river/reach. Takes effect on the next `compute`.
    fn set_parameter(&mut self, location: &Location, value: f64) -> RunnerResult<()>;

    /// Run the model and block until it finishes.
    fn compute(&mut self) -> RunnerResult<()>;

    /// One value per flow profile from the last run.
    ///
    /// `station = None` asks for the reach's default output point.
    fn retrieve_series(
        &mut self,
        location: &Location,
        station: Option<&str>,
        kind: SeriesKind,
        profile_count: usize,
    ) -> RunnerResult<Vec<f64>>;
}

impl<R: SimulationRunner + ?Sized> SimulationRunner for &mut R {
    fn set_parameter(&mut self, location: &Location, value: f64) -> RunnerResult<()> {
        (**self).set_parameter(location, value)
    }

    fn compute(&mut self) -> RunnerResult<()> {
        (**self).compute()
    }

    fn retrieve_series(
        &mut self,
        location: &Location,
        station: Option<&str>,
        kind: SeriesKind,
        profile_count: usize,
    ) -> RunnerResult<Vec<f64>> {
        (**self).retrieve_series(location, station, kind, profile_count)
    }
}

/// Which location a named parameter controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    pub name: String,
    pub location: Location,
}

/// Everything fixed across the candidates of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub bindings: Vec<ParameterBinding>,
    /// Where results are read.
    pub target: Location,
    /// Stations to read; empty reads the whole reach under [`WHOLE_REACH`].
    pub stations: Vec<String>,
    pub kind: SeriesKind,
    pub profile_count: usize,
}

impl SimulationPlan {
    /// A single parameter controlling, and read back at, one station of one reach.
    pub fn single(
        parameter: impl Into<String>,
        location: Location,
        station: impl Into<String>,
        kind: SeriesKind,
        profile_count: usize,
    ) -> Self {
        Self {
            bindings: vec![ParameterBinding {
                name: parameter.into(),
                location: location.clone(),
            }],
            target: location,
            stations: vec![station.into()],
            kind,
            profile_count,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(CalibrationError::configuration(
                "No parameter is bound to a simulator location.",
            ));
        }
        if self.profile_count == 0 {
            return Err(CalibrationError::configuration("Profile count must be >= 1."));
        }
        Ok(())
    }
}

/// Series retrieved for one candidate, keyed by station.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    pub parameters: ParameterSet,
    pub series: BTreeMap<String, Vec<f64>>,
}

impl SimulationOutput {
    pub fn station(&self, station: &str) -> Option<&[f64]> {
        self.series.get(station).map(Vec::as_slice)
    }
}

/// Sequential batch driver over a [`SimulationRunner`].
pub struct Simulator<R> {
    runner: R,
    plan: SimulationPlan,
    completed: usize,
}

impl<R: SimulationRunner> Simulator<R> {
    pub fn new(runner: R, plan: SimulationPlan) -> Result<Self> {
        plan.validate()?;
        Ok(Self {
            runner,
            plan,
            completed: 0,
        })
    }

    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    /// Simulations finished since this driver was built.
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Run one candidate. Values are rounded before they reach the runner.
    pub fn run(&mut self, candidate: &ParameterSet) -> Result<SimulationOutput> {
        let candidate = candidate.rounded(TRANSMIT_DECIMALS);

        for binding in &self.plan.bindings {
            let value = candidate.get(&binding.name).ok_or_else(|| {
                CalibrationError::configuration(format!(
                    "Candidate [{candidate}] has no value for bound parameter '{}'.",
                    binding.name
                ))
            })?;
            self.runner
                .set_parameter(&binding.location, value)
                .map_err(|e| wrap(&candidate, &binding.location, e))?;
        }

        self.runner
            .compute()
            .map_err(|e| wrap(&candidate, &self.plan.target, e))?;

        let plan = &self.plan;
        let mut series = BTreeMap::new();
        if plan.stations.is_empty() {
            let values = retrieve(&mut self.runner, plan, &candidate, None)?;
            series.insert(WHOLE_REACH.to_string(), values);
        } else {
            for station in &plan.stations {
                let values = retrieve(&mut self.runner, plan, &candidate, Some(station))?;
                series.insert(station.clone(), values);
            }
        }

        self.completed += 1;
        debug!(candidate = %candidate, "simulation finished");
        Ok(SimulationOutput {
            parameters: candidate,
            series,
        })
    }

    /// Run every candidate in order. The first failure aborts the batch.
    pub fn run_batch(&mut self, candidates: &[ParameterSet]) -> Result<Vec<SimulationOutput>> {
        let total = candidates.len();
        let mut out = Vec::with_capacity(total);
        for (i, candidate) in candidates.iter().enumerate() {
            out.push(self.run(candidate)?);
            info!("completed {}/{} simulations", i + 1, total);
        }
        Ok(out)
    }
}

fn retrieve<R: SimulationRunner>(
    runner: &mut R,
    plan: &SimulationPlan,
    candidate: &ParameterSet,
    station: Option<&str>,
) -> Result<Vec<f64>> {
    let values = runner
        .retrieve_series(&plan.target, station, plan.kind, plan.profile_count)
        .map_err(|e| wrap(candidate, &plan.target, e))?;
    if values.len() != plan.profile_count {
        return Err(CalibrationError::configuration(format!(
            "Simulator returned {} {} values for station {} but {} profiles were requested.",
            values.len(),
            plan.kind.column(),
            station.unwrap_or(WHOLE_REACH),
            plan.profile_count
        )));
    }
    Ok(values)
}

fn wrap(candidate: &ParameterSet, location: &Location, err: RunnerError) -> CalibrationError {
    CalibrationError::Simulation {
        candidate: candidate.to_string(),
        location: location.to_string(),
        message: err.to_string(),
    }
}

/// In-memory runner for tests: the series is a function of the last value set.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    type Model = Box<dyn Fn(f64, usize) -> Vec<f64>>;

    pub struct FnRunner {
        model: Model,
        pub current: Option<f64>,
        pub computed: usize,
        pub log: Vec<(Location, f64)>,
        pub fail_at: Option<f64>,
    }

    impl FnRunner {
        pub fn new(model: impl Fn(f64, usize) -> Vec<f64> + 'static) -> Self {
            Self {
                model: Box::new(model),
                current: None,
                computed: 0,
                log: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl SimulationRunner for FnRunner {
        fn set_parameter(&mut self, location: &Location, value: f64) -> RunnerResult<()> {
            self.log.push((location.clone(), value));
            self.current = Some(value);
            Ok(())
        }

        fn compute(&mut self) -> RunnerResult<()> {
            if self.fail_at.is_some() && self.current == self.fail_at {
                return Err(RunnerError::Failed("solver diverged".to_string()));
            }
            self.computed += 1;
            Ok(())
        }

        fn retrieve_series(
            &mut self,
            _location: &Location,
            _station: Option<&str>,
            _kind: SeriesKind,
            profile_count: usize,
        ) -> RunnerResult<Vec<f64>> {
            let n = self.current.ok_or_else(|| RunnerError::Failed("nothing computed".into()))?;
            Ok((self.model)(n, profile_count))
        }
    }
}
