//! Automated multi-objective search.
//!
//! The population dynamics belong to an external optimizer behind
//! [`MultiObjectiveOptimizer`]. This module supplies it with a one-variable
//! problem (the roughness), an objective that simulates and scores a value,
//! and then re-simulates every value the optimizer returns so the reported
//! numbers come from the authoritative runner rather than from the
//! optimizer's internal bookkeeping.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibrate::{plan_for, score_outputs};
use crate::domain::{CalibrationConfig, CandidateResult, ParameterSet};
use crate::error::{CalibrationError, Result};
use crate::eval::Evaluator;
use crate::sim::{SimulationRunner, Simulator};

/// Smallest roughness handed to the simulator; zero friction breaks most solvers.
pub const SEARCH_LOWER: f64 = 0.001;
pub const SEARCH_UPPER: f64 = 1.0;

/// Shape of the problem given to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchProblem {
    pub variables: usize,
    pub objectives: usize,
    pub constraints: usize,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl SearchProblem {
    /// One roughness variable, one objective per metric, two bound constraints.
    pub fn roughness(objectives: usize) -> Self {
        Self {
            variables: 1,
            objectives,
            constraints: 2,
            lower: vec![SEARCH_LOWER],
            upper: vec![SEARCH_UPPER],
        }
    }
}

/// Objective and constraint values at one point.
///
/// Objectives are minimized; a constraint is satisfied when it is `< 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fitness {
    pub objectives: Vec<f64>,
    pub constraints: Vec<f64>,
}

impl Fitness {
    pub fn feasible(&self) -> bool {
        self.constraints.iter().all(|c| *c < 0.0)
    }
}

/// A point of the optimizer's final non-dominated set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub variables: Vec<f64>,
    pub objectives: Vec<f64>,
}

pub trait ObjectiveFunction {
    fn evaluate(&mut self, variables: &[f64]) -> Result<Fitness>;
}

/// Any population-based multi-objective optimizer.
pub trait MultiObjectiveOptimizer {
    fn search(
        &mut self,
        problem: &SearchProblem,
        objective: &mut dyn ObjectiveFunction,
        population_size: usize,
        evaluation_budget: usize,
    ) -> Result<Vec<Solution>>;
}

/// Simulate at `x`, score the requested metrics, minimize them.
pub struct RoughnessObjective<'a, R> {
    simulator: &'a mut Simulator<R>,
    evaluator: &'a Evaluator,
    parameter: &'a str,
    station: &'a str,
    evaluations: usize,
}

impl<'a, R: SimulationRunner> RoughnessObjective<'a, R> {
    pub fn new(
        simulator: &'a mut Simulator<R>,
        evaluator: &'a Evaluator,
        parameter: &'a str,
        station: &'a str,
    ) -> Self {
        Self {
            simulator,
            evaluator,
            parameter,
            station,
            evaluations: 0,
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl<R: SimulationRunner> ObjectiveFunction for RoughnessObjective<'_, R> {
    fn evaluate(&mut self, variables: &[f64]) -> Result<Fitness> {
        let [x] = variables else {
            return Err(CalibrationError::optimizer(format!(
                "Expected 1 decision variable, got {}.",
                variables.len()
            )));
        };
        let x = *x;
        let output = self
            .simulator
            .run(&ParameterSet::single(self.parameter, x))?;
        let scored = score_outputs(self.evaluator, self.station, vec![output])?;
        let objectives = scored
            .into_iter()
            .next()
            .map(|r| r.minimized.values())
            .unwrap_or_default();

        self.evaluations += 1;
        info!(evaluation = self.evaluations, x, "objective evaluated");
        Ok(Fitness {
            objectives,
            constraints: vec![-x, x - 1.0],
        })
    }
}

/// Run an automated search and return re-simulated, raw-scored results
/// in the order the optimizer reported them.
pub fn automated_search<R, O>(
    config: &CalibrationConfig,
    evaluator: &Evaluator,
    runner: R,
    optimizer: &mut O,
) -> Result<Vec<CandidateResult>>
where
    R: SimulationRunner,
    O: MultiObjectiveOptimizer + ?Sized,
{
    if config.sample_count == 0 {
        return Err(CalibrationError::configuration("Population size must be >= 1."));
    }
    if config.evaluations == 0 {
        return Err(CalibrationError::configuration("Evaluation budget must be >= 1."));
    }

    let mut simulator = Simulator::new(runner, plan_for(config, evaluator))?;
    let problem = SearchProblem::roughness(evaluator.metric_names().len());

    let solutions = {
        let mut objective = RoughnessObjective::new(
            &mut simulator,
            evaluator,
            &config.parameter_name,
            &config.station,
        );
        let solutions = optimizer.search(
            &problem,
            &mut objective,
            config.sample_count,
            config.evaluations,
        )?;
        info!(
            evaluations = objective.evaluations(),
            solutions = solutions.len(),
            "optimizer finished"
        );
        solutions
    };

    let candidates = solutions
        .iter()
        .map(|s| solution_candidate(s, &config.parameter_name))
        .collect::<Result<Vec<_>>>()?;
    if candidates.is_empty() {
        return Err(CalibrationError::optimizer("Optimizer returned no solutions."));
    }

    let outputs = simulator.run_batch(&candidates)?;
    score_outputs(evaluator, &config.station, outputs)
}

fn solution_candidate(solution: &Solution, parameter: &str) -> Result<ParameterSet> {
    match solution.variables.as_slice() {
        [x] if x.is_finite() => Ok(ParameterSet::single(parameter, *x)),
        vars => Err(CalibrationError::optimizer(format!(
            "Optimizer returned an unusable solution {vars:?}."
        ))),
    }
}
