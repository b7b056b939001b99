//! Optimizer running as a child process.
//!
//! The child drives the search over line-delimited JSON. It first receives
//! the problem:
//!
//! ```json
//! {"problem": {"variables": 1, "objectives": 3, "constraints": 2,
//!              "lower": [0.001], "upper": [1.0]},
//!  "population_size": 20, "evaluation_budget": 400}
//! ```
//!
//! then asks for one evaluation per line and gets one fitness line back,
//! and ends with its non-dominated set:
//!
//! ```json
//! {"evaluate": [0.035]}
//! {"objectives": [0.12, -0.97], "constraints": [-0.035, -0.965]}
//! {"solutions": [{"variables": [0.035], "objectives": [0.12, -0.97]}]}
//! ```
//!
//! Objectives that scored NaN are sent as `null`.

use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibrate::{MultiObjectiveOptimizer, ObjectiveFunction, SearchProblem, Solution};
use crate::error::{CalibrationError, Result};
use crate::sim::command::{drain, join};

#[derive(Debug, Clone)]
pub struct ProcessOptimizer {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Serialize)]
struct Setup<'a> {
    problem: &'a SearchProblem,
    population_size: usize,
    evaluation_budget: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Request {
    Evaluate(Vec<f64>),
    Solutions(Vec<Solution>),
}

impl ProcessOptimizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn failure(&self, message: impl fmt::Display) -> CalibrationError {
        CalibrationError::optimizer(format!("'{}': {message}", self.program.display()))
    }

    /// Talk to the child until it reports solutions or closes its output.
    fn exchange(
        &self,
        child: &mut Child,
        setup: &Setup<'_>,
        objective: &mut dyn ObjectiveFunction,
    ) -> Result<Option<Vec<Solution>>> {
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(self.failure("standard streams unavailable"));
        };
        send(&mut stdin, setup).map_err(|e| self.failure(format!("could not send problem: {e}")))?;

        let mut requested = 0usize;
        for line in BufReader::new(stdout).lines() {
            let line = line.map_err(|e| CalibrationError::io("Failed to read optimizer output", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let request: Request = serde_json::from_str(&line)
                .map_err(|e| self.failure(format!("unreadable message {line:?}: {e}")))?;
            match request {
                Request::Evaluate(variables) => {
                    requested += 1;
                    if requested == setup.evaluation_budget + 1 {
                        warn!(budget = setup.evaluation_budget, "optimizer exceeded its evaluation budget");
                    }
                    let fitness = objective.evaluate(&variables)?;
                    send(&mut stdin, &fitness)
                        .map_err(|e| self.failure(format!("could not send fitness: {e}")))?;
                }
                Request::Solutions(solutions) => {
                    info!(evaluations = requested, solutions = solutions.len(), "optimizer reported");
                    return Ok(Some(solutions));
                }
            }
        }
        Ok(None)
    }
}

impl MultiObjectiveOptimizer for ProcessOptimizer {
    fn search(
        &mut self,
        problem: &SearchProblem,
        objective: &mut dyn ObjectiveFunction,
        population_size: usize,
        evaluation_budget: usize,
    ) -> Result<Vec<Solution>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(format!("could not start: {e}")))?;
        debug!(program = %self.program.display(), population_size, evaluation_budget, "optimizer started");
        let stderr = drain(child.stderr.take());

        let setup = Setup {
            problem,
            population_size,
            evaluation_budget,
        };
        let outcome = self.exchange(&mut child, &setup, objective);
        if outcome.is_err() {
            let _ = child.kill();
        }
        let status = child
            .wait()
            .map_err(|e| CalibrationError::io("Failed to wait for the optimizer", e))?;
        let stderr = join(stderr).unwrap_or_default();
        let detail = stderr.trim();

        match outcome? {
            Some(solutions) if status.success() => Ok(solutions),
            Some(_) => Err(self.failure(format!("{status} after reporting solutions: {detail}"))),
            None => Err(self.failure(format!("{status} without reporting solutions: {detail}"))),
        }
    }
}

fn send<T: Serialize>(stdin: &mut ChildStdin, message: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stdin, message)?;
    stdin.write_all(b"\n")?;
    stdin.flush()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::calibrate::Fitness;

    /// Objective equal to the variable itself.
    #[derive(Default)]
    struct Echo {
        seen: Vec<f64>,
    }

    impl ObjectiveFunction for Echo {
        fn evaluate(&mut self, variables: &[f64]) -> Result<Fitness> {
            let x = variables[0];
            self.seen.push(x);
            Ok(Fitness {
                objectives: vec![x],
                constraints: vec![-x, x - 1.0],
            })
        }
    }

    fn sh(script: &str) -> ProcessOptimizer {
        ProcessOptimizer::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn search(optimizer: &mut ProcessOptimizer, objective: &mut dyn ObjectiveFunction) -> Result<Vec<Solution>> {
        optimizer.search(&SearchProblem::roughness(1), objective, 3, 10)
    }

    #[test]
    fn evaluations_are_answered_and_solutions_returned() {
        let mut optimizer = sh(r#"
read setup
case "$setup" in *'"population_size":3'*'"evaluation_budget":10'*) ;; *) exit 9 ;; esac
echo '{"evaluate":[0.04]}'
read fitness
case "$fitness" in *'"objectives":[0.04]'*) ;; *) exit 8 ;; esac
echo '{"evaluate":[0.02]}'
read fitness
echo '{"solutions":[{"variables":[0.02],"objectives":[0.02]}]}'
"#);
        let mut objective = Echo::default();
        let solutions = search(&mut optimizer, &mut objective).unwrap();
        assert_eq!(objective.seen, vec![0.04, 0.02]);
        assert_eq!(
            solutions,
            vec![Solution {
                variables: vec![0.02],
                objectives: vec![0.02],
            }]
        );
    }

    #[test]
    fn exiting_without_solutions_is_an_optimizer_error() {
        let mut optimizer = sh("read setup; echo 'population collapsed' >&2; exit 4");
        let err = search(&mut optimizer, &mut Echo::default()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("population collapsed"), "{err}");
    }

    #[test]
    fn unreadable_messages_are_rejected() {
        let mut optimizer = sh("read setup; echo 'generation 1 done'; sleep 5");
        let err = search(&mut optimizer, &mut Echo::default()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn objective_failures_stop_the_optimizer() {
        struct Broken;
        impl ObjectiveFunction for Broken {
            fn evaluate(&mut self, _variables: &[f64]) -> Result<Fitness> {
                Err(CalibrationError::configuration("no series"))
            }
        }
        let mut optimizer = sh("read setup; echo '{\"evaluate\":[0.5]}'; sleep 5");
        let err = search(&mut optimizer, &mut Broken).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
