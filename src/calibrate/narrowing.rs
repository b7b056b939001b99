//! Interactive narrowing.
//!
//! The operator proposes bounds, the session simulates and scores a batch,
//! shows the retained candidates and asks whether to go again:
//!
//! ```text
//! AwaitingBounds -> Simulating -> Evaluating -> Displaying -> AwaitingContinueDecision
//!       ^                                                              |
//!       +------------------------- continue ---------------------------+
//!                                                   stop -> Terminated
//! ```
//!
//! A batch always runs to completion; stopping only takes effect between
//! batches. Rejected bounds send the session back to `AwaitingBounds`.

use std::mem;

use tracing::{info, warn};

use crate::calibrate::{criteria_for, plan_for, score_outputs};
use crate::domain::{CalibrationConfig, CandidateResult, ParameterSpec};
use crate::error::{CalibrationError, Result};
use crate::eval::{Evaluator, select_best};
use crate::params::ParameterSpace;
use crate::report::ReportTable;
use crate::sim::{SimulationOutput, SimulationRunner, Simulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrowingState {
    AwaitingBounds,
    Simulating,
    Evaluating,
    Displaying,
    AwaitingContinueDecision,
    Terminated,
}

/// Bounds proposed by the operator for the next batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub count: usize,
    /// Overrides the session's sampling mode for this batch.
    pub randomized: Option<bool>,
}

impl Bounds {
    pub fn new(min: f64, max: f64, count: usize) -> Self {
        Self {
            min,
            max,
            count,
            randomized: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Whoever steers the narrowing: a console prompt, a GUI or a test script.
pub trait Operator {
    /// Bounds for the next batch, or `None` to stop.
    fn bounds(&mut self, iteration: usize) -> Result<Option<Bounds>>;

    /// Show the retained candidates of a finished batch.
    fn display(&mut self, iteration: usize, table: &ReportTable) -> Result<()>;

    fn decide(&mut self) -> Result<Decision>;

    /// Bounds were unusable; the operator will be asked again.
    fn reject(&mut self, error: &CalibrationError) -> Result<()> {
        warn!("{error}");
        Ok(())
    }
}

/// Receives the last retained batch when the session terminates.
pub trait ReportSink {
    fn finish(&mut self, results: &[CandidateResult]) -> Result<()>;
}

/// Sink that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardReport;

impl ReportSink for DiscardReport {
    fn finish(&mut self, _results: &[CandidateResult]) -> Result<()> {
        Ok(())
    }
}

pub struct NarrowingSession<R> {
    config: CalibrationConfig,
    evaluator: Evaluator,
    simulator: Simulator<R>,
    space: ParameterSpace,
    state: NarrowingState,
    iteration: usize,
    pending: Option<ParameterSpec>,
    outputs: Vec<SimulationOutput>,
    retained: Vec<CandidateResult>,
}

impl<R: SimulationRunner> NarrowingSession<R> {
    /// Build a session. Selection settings are checked before anything runs.
    pub fn new(config: CalibrationConfig, evaluator: Evaluator, runner: R) -> Result<Self> {
        criteria_for(&config, &evaluator, config.sample_count).check()?;
        let simulator = Simulator::new(runner, plan_for(&config, &evaluator))?;
        let space = ParameterSpace::new(config.seed);
        Ok(Self {
            config,
            evaluator,
            simulator,
            space,
            state: NarrowingState::AwaitingBounds,
            iteration: 0,
            pending: None,
            outputs: Vec::new(),
            retained: Vec::new(),
        })
    }

    pub fn state(&self) -> NarrowingState {
        self.state
    }

    /// Batches started so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Candidates retained by the most recent batch.
    pub fn retained(&self) -> &[CandidateResult] {
        &self.retained
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Drive the session until the operator stops, then hand the last batch to `sink`.
    pub fn run<O, S>(&mut self, operator: &mut O, sink: &mut S) -> Result<Vec<CandidateResult>>
    where
        O: Operator + ?Sized,
        S: ReportSink + ?Sized,
    {
        while self.step(operator)? != NarrowingState::Terminated {}
        info!(iterations = self.iteration, "narrowing finished");
        if !self.retained.is_empty() {
            sink.finish(&self.retained)?;
        }
        Ok(self.retained.clone())
    }

    /// Perform one transition and return the new state.
    pub fn step<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<NarrowingState> {
        self.state = match self.state {
            NarrowingState::AwaitingBounds => self.await_bounds(operator)?,
            NarrowingState::Simulating => self.simulate()?,
            NarrowingState::Evaluating => self.evaluate()?,
            NarrowingState::Displaying => {
                let table = ReportTable::from_results(&self.retained);
                operator.display(self.iteration, &table)?;
                NarrowingState::AwaitingContinueDecision
            }
            NarrowingState::AwaitingContinueDecision => match operator.decide()? {
                Decision::Continue => NarrowingState::AwaitingBounds,
                Decision::Stop => NarrowingState::Terminated,
            },
            NarrowingState::Terminated => NarrowingState::Terminated,
        };
        Ok(self.state)
    }

    fn await_bounds<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<NarrowingState> {
        let Some(bounds) = operator.bounds(self.iteration + 1)? else {
            return Ok(NarrowingState::Terminated);
        };
        let spec = ParameterSpec::new(
            self.config.parameter_name.clone(),
            bounds.min,
            bounds.max,
            bounds.count,
        )
        .randomized(bounds.randomized.unwrap_or(self.config.randomized));

        match spec.validate() {
            Ok(()) => {
                self.pending = Some(spec);
                Ok(NarrowingState::Simulating)
            }
            Err(err @ CalibrationError::Configuration { .. }) => {
                operator.reject(&err)?;
                Ok(NarrowingState::AwaitingBounds)
            }
            Err(err) => Err(err),
        }
    }

    fn simulate(&mut self) -> Result<NarrowingState> {
        let spec = self.pending.take().ok_or_else(|| {
            CalibrationError::configuration("No bounds were accepted before simulating.")
        })?;
        self.iteration += 1;
        let candidates = self.space.generate(std::slice::from_ref(&spec))?;
        info!(
            iteration = self.iteration,
            min = spec.min,
            max = spec.max,
            candidates = candidates.len(),
            "starting batch"
        );
        self.outputs = self.simulator.run_batch(&candidates)?;
        Ok(NarrowingState::Evaluating)
    }

    fn evaluate(&mut self) -> Result<NarrowingState> {
        let outputs = mem::take(&mut self.outputs);
        let scored = score_outputs(&self.evaluator, &self.config.station, outputs)?;
        let total = scored.len();
        let criteria = criteria_for(&self.config, &self.evaluator, total);
        self.retained = select_best(scored, &criteria)?;
        info!(
            iteration = self.iteration,
            retained = self.retained.len(),
            candidates = total,
            "batch evaluated"
        );
        Ok(NarrowingState::Displaying)
    }
}
