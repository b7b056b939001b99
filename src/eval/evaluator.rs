//! Scoring of simulated series against the observations.
//!
//! The evaluator owns an immutable configuration (observed series, requested
//! metrics, datum flag) and a metric registry. It is built once per run and
//! then applied to every candidate; nothing about one call leaks into the next.
//!
//! Datum correction aligns the low-flow tail: both series are sorted, the
//! bottom `⌊len/20⌋ + 1` values of each are averaged, and the difference of
//! those means is added to every simulated value before scoring.

use tracing::debug;

use crate::domain::{CandidateResult, MetricVector, ParameterSet};
use crate::error::{CalibrationError, Result};
use crate::math::{mean, sorted};
use crate::metrics::MetricRegistry;

/// Immutable evaluator settings.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub observed: Vec<f64>,
    /// Metrics to compute, in output order; `None` = the whole registry.
    pub metrics: Option<Vec<String>>,
    pub correct_datum: bool,
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: MetricRegistry,
    config: EvaluatorConfig,
    names: Vec<String>,
}

impl Evaluator {
    /// Validate the observed series and metric names, then build the evaluator.
    ///
    /// Each metric is also scored once on the observed series against itself,
    /// so inputs that are degenerate whatever the simulation returns (a
    /// constant series for `nse`, a zero sum for `pbias`) fail here.
    pub fn new(registry: MetricRegistry, config: EvaluatorConfig) -> Result<Self> {
        validate_observed(&config.observed)?;
        let names = registry.resolve_names(config.metrics.as_deref())?;
        for name in &names {
            let def = registry.get(name)?;
            (def.score)(&config.observed, &config.observed)?;
        }
        Ok(Self {
            registry,
            config,
            names,
        })
    }

    pub fn observed(&self) -> &[f64] {
        &self.config.observed
    }

    /// Metric names in output order.
    pub fn metric_names(&self) -> &[String] {
        &self.names
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn corrects_datum(&self) -> bool {
        self.config.correct_datum
    }

    /// Raw metric vector for one simulated series.
    pub fn evaluate(&self, simulated: &[f64]) -> Result<MetricVector> {
        let observed = &self.config.observed;
        if simulated.len() != observed.len() {
            return Err(CalibrationError::configuration(format!(
                "Simulated series has {} values but {} observations were supplied.",
                simulated.len(),
                observed.len()
            )));
        }

        let adjusted;
        let simulated = if self.config.correct_datum {
            adjusted = correct_datum(observed, simulated);
            adjusted.as_slice()
        } else {
            simulated
        };

        let mut out = MetricVector::new();
        for name in &self.names {
            let def = self.registry.get(name)?;
            out.push(name.clone(), (def.score)(simulated, observed)?);
        }
        Ok(out)
    }

    /// Transform a raw vector so lower is better in every position.
    pub fn minimize(&self, raw: &MetricVector) -> Result<MetricVector> {
        raw.iter()
            .map(|(name, value)| {
                let def = self.registry.get(name)?;
                Ok((name.to_string(), (def.minimize)(value)))
            })
            .collect()
    }

    /// Score one candidate into an immutable result.
    pub fn score(&self, parameters: ParameterSet, simulated: Vec<f64>) -> Result<CandidateResult> {
        let metrics = self
            .evaluate(&simulated)
            .map_err(|e| e.for_candidate(&parameters))?;
        let minimized = self
            .minimize(&metrics)
            .map_err(|e| e.for_candidate(&parameters))?;
        Ok(CandidateResult {
            parameters,
            metrics,
            minimized,
            simulated,
        })
    }
}

/// One-shot evaluation without building an [`Evaluator`] first.
pub fn evaluate(
    registry: &MetricRegistry,
    observed: &[f64],
    simulated: &[f64],
    metrics: Option<&[String]>,
    correct_datum: bool,
) -> Result<MetricVector> {
    let evaluator = Evaluator::new(
        registry.clone(),
        EvaluatorConfig {
            observed: observed.to_vec(),
            metrics: metrics.map(<[String]>::to_vec),
            correct_datum,
        },
    )?;
    evaluator.evaluate(simulated)
}

fn validate_observed(observed: &[f64]) -> Result<()> {
    if observed.is_empty() {
        return Err(CalibrationError::configuration("Observed series is empty."));
    }
    if let Some(i) = observed.iter().position(|v| !v.is_finite()) {
        return Err(CalibrationError::configuration(format!(
            "Observed value #{} is not finite.",
            i + 1
        )));
    }
    Ok(())
}

/// Number of low-tail values averaged for the datum offset.
pub fn datum_tail_len(observed_len: usize) -> usize {
    observed_len / 20 + 1
}

/// Offset added to the simulated series so both low tails share a mean.
pub fn datum_offset(observed: &[f64], simulated: &[f64]) -> f64 {
    let count = datum_tail_len(observed.len())
        .min(observed.len())
        .min(simulated.len());
    if count == 0 {
        return 0.0;
    }
    let obs_tail = mean(&sorted(observed)[..count]);
    let sim_tail = mean(&sorted(simulated)[..count]);
    obs_tail - sim_tail
}

/// Simulated series shifted by the datum offset.
pub fn correct_datum(observed: &[f64], simulated: &[f64]) -> Vec<f64> {
    let offset = datum_offset(observed, simulated);
    debug!(offset, "datum correction");
    simulated.iter().map(|s| s + offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// An empty `metrics` slice requests the whole registry.
    fn evaluator(metrics: &[&str], correct_datum: bool) -> Evaluator {
        Evaluator::new(
            MetricRegistry::standard(),
            EvaluatorConfig {
                observed: vec![1.0, 2.0, 4.0, 8.0, 16.0],
                metrics: (!metrics.is_empty())
                    .then(|| metrics.iter().map(|s| s.to_string()).collect()),
                correct_datum,
            },
        )
        .unwrap()
    }

    #[test]
    fn tail_length_is_about_five_percent_and_never_zero() {
        assert_eq!(datum_tail_len(5), 1);
        assert_eq!(datum_tail_len(19), 1);
        assert_eq!(datum_tail_len(20), 2);
        assert_eq!(datum_tail_len(100), 6);
    }

    #[test]
    fn corrected_tail_mean_matches_observed_tail_mean() {
        let observed: Vec<f64> = (0..45)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 3.0 + i as f64 * 0.1)
            .collect();
        let simulated: Vec<f64> = observed.iter().map(|o| o * 1.02 - 7.5).collect();
        let corrected = correct_datum(&observed, &simulated);

        let k = datum_tail_len(observed.len());
        let obs_tail = mean(&sorted(&observed)[..k]);
        let sim_tail = mean(&sorted(&corrected)[..k]);
        assert_relative_eq!(obs_tail, sim_tail, epsilon = 1e-9);
    }

    #[test]
    fn datum_correction_removes_constant_offset() {
        let ev = evaluator(&["rmse", "pbias"], true);
        let shifted = [3.0, 4.0, 6.0, 10.0, 18.0];
        let m = ev.evaluate(&shifted).unwrap();
        assert_relative_eq!(m.get("rmse").unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.get("pbias").unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn without_datum_correction_offset_is_penalized() {
        let ev = evaluator(&["rmse"], false);
        let shifted = [3.0, 4.0, 6.0, 10.0, 18.0];
        assert_relative_eq!(ev.evaluate(&shifted).unwrap().get("rmse").unwrap(), 2.0);
    }

    #[test]
    fn subset_is_returned_in_request_order() {
        let ev = evaluator(&["nse", "rmse", "r2"], false);
        let m = ev.evaluate(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(m.names(), vec!["nse", "rmse", "r2"]);
    }

    #[test]
    fn all_metrics_in_registry_order() {
        let ev = evaluator(&[], false);
        let m = ev.evaluate(&[1.0, 3.0, 6.0, 7.0, 20.0]).unwrap();
        assert_eq!(m.names(), MetricRegistry::standard().names());
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let ev = evaluator(&[], false);
        let err = ev.evaluate(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_metric_fails_at_construction() {
        let err = Evaluator::new(
            MetricRegistry::standard(),
            EvaluatorConfig {
                observed: vec![1.0, 2.0],
                metrics: Some(vec!["bogus".to_string()]),
                correct_datum: false,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn non_finite_observed_is_rejected() {
        let err = evaluate(
            &MetricRegistry::standard(),
            &[1.0, f64::NAN],
            &[1.0, 2.0],
            None,
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn degenerate_observed_series_fail_at_construction() {
        let build = |observed: Vec<f64>, metric: &str| {
            Evaluator::new(
                MetricRegistry::standard(),
                EvaluatorConfig {
                    observed,
                    metrics: Some(vec![metric.to_string(), "rmse".to_string()]),
                    correct_datum: false,
                },
            )
        };
        assert_eq!(build(vec![3.0; 4], "nse").unwrap_err().exit_code(), 3);
        assert_eq!(build(vec![3.0; 4], "r2").unwrap_err().exit_code(), 3);
        assert_eq!(build(vec![1.0, -1.0], "pbias").unwrap_err().exit_code(), 3);
        assert_eq!(build(vec![4.0], "paired").unwrap_err().exit_code(), 3);
        assert!(build(vec![3.0; 4], "mae").is_ok());
    }

    #[test]
    fn scoring_errors_name_the_candidate() {
        let ev = evaluator(&[], false);
        let err = ev
            .score(ParameterSet::single("n", 0.03), vec![1.0, 2.0])
            .unwrap_err();
        assert!(err.to_string().contains("n=0.03"), "{err}");

        fn non_negative(simulated: &[f64], _observed: &[f64]) -> Result<f64> {
            if simulated.iter().any(|v| *v < 0.0) {
                return Err(CalibrationError::evaluation("non_negative", "Negative stage."));
            }
            Ok(0.0)
        }
        let mut registry = MetricRegistry::empty();
        registry
            .register("non_negative", non_negative, crate::metrics::identity)
            .unwrap();
        let ev = Evaluator::new(
            registry,
            EvaluatorConfig {
                observed: vec![1.0, 1.0, 2.0],
                metrics: None,
                correct_datum: false,
            },
        )
        .unwrap();
        let err = ev
            .score(ParameterSet::single("n", 0.045), vec![1.0, -1.0, 2.0])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "evaluation error in metric 'non_negative' for candidate [n=0.045]: Negative stage."
        );
    }

    #[test]
    fn flat_simulation_scores_nan_r2() {
        let ev = evaluator(&["r2", "rmse"], false);
        let result = ev
            .score(ParameterSet::single("n", 0.03), vec![4.0; 5])
            .unwrap();
        assert!(result.metrics.get("r2").unwrap().is_nan());
        assert!(result.minimized.get("r2").unwrap().is_nan());
    }

    #[test]
    fn score_builds_minimized_vector() {
        let ev = evaluator(&["r2", "pbias", "rmse"], false);
        let result = ev
            .score(ParameterSet::single("n", 0.03), vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        let r2 = result.metrics.get("r2").unwrap();
        let pbias = result.metrics.get("pbias").unwrap();
        assert_eq!(result.minimized.get("r2").unwrap(), -r2);
        assert_eq!(result.minimized.get("pbias").unwrap(), pbias.abs());
        assert!(pbias < 0.0);
        assert_eq!(result.simulated, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
