//! Selection of the reported candidates.
//!
//! Selection rules:
//! 1. One requested metric: rank by its minimized value, keep the best `n`.
//! 2. Several metrics: optionally drop dominated candidates, then optionally
//!    rank the survivors by one metric and keep the best `n`.
//!
//! Dominance here is deliberately stricter than textbook Pareto dominance:
//! `a` is dominated only when some other candidate is strictly lower than `a`
//! in *every* metric. A tie in any single metric keeps `a` alive. Downstream
//! reports depend on which candidates survive, so the rule is kept as is.

use std::cmp::Ordering;

use crate::domain::CandidateResult;
use crate::error::{CalibrationError, Result};

/// How to reduce a scored batch to the reported set.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    /// Metric names in comparison order (must match every candidate's vectors).
    pub metrics: Vec<String>,
    /// Rank the (possibly filtered) set by this metric.
    pub best_by: Option<String>,
    pub use_pareto: bool,
    /// How many candidates to keep when ranking.
    pub n: usize,
}

/// Reduce `candidates` to the reported set.
///
/// Candidates keep their generation order except where ranking reorders
/// them; ranking ties also keep generation order. The returned results still
/// carry their raw metric vectors and simulated series.
pub fn select_best(
    candidates: Vec<CandidateResult>,
    criteria: &SelectionCriteria,
) -> Result<Vec<CandidateResult>> {
    validate(&candidates, criteria)?;

    if criteria.metrics.len() == 1 {
        return Ok(best_n(candidates, 0, criteria.n));
    }

    let mut working = candidates;
    if criteria.use_pareto {
        working = non_dominated(working);
    }
    if let Some(best_by) = &criteria.best_by {
        let idx = metric_index(&criteria.metrics, best_by)?;
        working = best_n(working, idx, criteria.n);
    }
    Ok(working)
}

impl SelectionCriteria {
    /// Reject criteria that cannot select anything, before any simulation runs.
    pub fn check(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(CalibrationError::configuration("Selection needs at least one metric."));
        }
        if self.n == 0 {
            return Err(CalibrationError::configuration("Selection count must be >= 1."));
        }
        if self.metrics.len() > 1 && !self.use_pareto && self.best_by.is_none() {
            return Err(CalibrationError::configuration(
                "With several metrics, enable Pareto filtering or name a metric to rank by.",
            ));
        }
        if let Some(best_by) = &self.best_by {
            metric_index(&self.metrics, best_by)?;
        }
        Ok(())
    }
}

fn validate(candidates: &[CandidateResult], criteria: &SelectionCriteria) -> Result<()> {
    criteria.check()?;
    for c in candidates {
        let names = c.minimized.names();
        if names.len() != criteria.metrics.len()
            || names.iter().zip(&criteria.metrics).any(|(a, b)| *a != b.as_str())
        {
            return Err(CalibrationError::configuration(format!(
                "Candidate [{}] has metrics {:?}, expected {:?}.",
                c.parameters, names, criteria.metrics
            )));
        }
    }
    Ok(())
}

fn metric_index(metrics: &[String], name: &str) -> Result<usize> {
    metrics.iter().position(|m| m == name).ok_or_else(|| {
        CalibrationError::configuration(format!(
            "Ranking metric '{name}' is not among the requested metrics {metrics:?}."
        ))
    })
}

/// `true` when `a` is strictly greater than `b` in every position.
pub fn strictly_worse_everywhere(a: &[f64], b: &[f64]) -> bool {
    !a.is_empty() && a.iter().zip(b).all(|(x, y)| x > y)
}

/// Candidates not dominated by any other candidate (see module docs).
pub fn non_dominated(candidates: Vec<CandidateResult>) -> Vec<CandidateResult> {
    let vectors: Vec<Vec<f64>> = candidates.iter().map(|c| c.minimized.values()).collect();
    let keep: Vec<bool> = (0..vectors.len())
        .map(|i| {
            !(0..vectors.len())
                .any(|j| j != i && strictly_worse_everywhere(&vectors[i], &vectors[j]))
        })
        .collect();

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c))
        .collect()
}

/// Stable ascending order with NaN last.
fn ascending_nan_last(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

fn best_n(candidates: Vec<CandidateResult>, idx: usize, n: usize) -> Vec<CandidateResult> {
    let mut keyed: Vec<(f64, CandidateResult)> = candidates
        .into_iter()
        .map(|c| (c.minimized.values()[idx], c))
        .collect();
    keyed.sort_by(|a, b| ascending_nan_last(a.0, b.0));
    keyed.into_iter().take(n).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MetricVector, ParameterSet};

    fn candidate(n: f64, names: &[&str], minimized: &[f64]) -> CandidateResult {
        let raw: MetricVector = names
            .iter()
            .zip(minimized)
            .map(|(k, v)| (k.to_string(), -v))
            .collect();
        let min: MetricVector = names
            .iter()
            .zip(minimized)
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        CandidateResult {
            parameters: ParameterSet::single("n", n),
            metrics: raw,
            minimized: min,
            simulated: vec![n; 3],
        }
    }

    fn criteria(
        metrics: &[&str],
        best_by: Option<&str>,
        use_pareto: bool,
        n: usize,
    ) -> SelectionCriteria {
        SelectionCriteria {
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            best_by: best_by.map(str::to_string),
            use_pareto,
            n,
        }
    }

    fn params(results: &[CandidateResult]) -> Vec<f64> {
        results.iter().map(|r| r.parameters.get("n").unwrap()).collect()
    }

    #[test]
    fn single_metric_ranks_ascending_and_truncates() {
        let pool = vec![
            candidate(0.01, &["rmse"], &[0.5]),
            candidate(0.02, &["rmse"], &[0.1]),
            candidate(0.03, &["rmse"], &[0.3]),
            candidate(0.04, &["rmse"], &[0.2]),
        ];
        let out = select_best(pool, &criteria(&["rmse"], None, true, 3)).unwrap();
        assert_eq!(params(&out), vec![0.02, 0.04, 0.03]);
    }

    #[test]
    fn single_metric_returns_whole_pool_when_smaller_than_n() {
        let pool = vec![
            candidate(0.01, &["mae"], &[0.5]),
            candidate(0.02, &["mae"], &[0.1]),
        ];
        let out = select_best(pool, &criteria(&["mae"], None, false, 10)).unwrap();
        assert_eq!(params(&out), vec![0.02, 0.01]);
    }

    #[test]
    fn single_metric_ties_keep_generation_order() {
        let pool = vec![
            candidate(0.01, &["rmse"], &[0.2]),
            candidate(0.02, &["rmse"], &[0.2]),
            candidate(0.03, &["rmse"], &[0.1]),
        ];
        let out = select_best(pool, &criteria(&["rmse"], None, true, 1)).unwrap();
        assert_eq!(params(&out), vec![0.03]);
    }

    #[test]
    fn candidate_worse_in_one_metric_only_survives() {
        // A is worse than B in metric 1 but tied in metric 2; C is worse than B everywhere.
        let names = ["rmse", "pbias"];
        let pool = vec![
            candidate(1.0, &names, &[0.9, 0.2]),
            candidate(2.0, &names, &[0.1, 0.2]),
            candidate(3.0, &names, &[0.5, 0.7]),
        ];
        let out = select_best(pool, &criteria(&names, None, true, 10)).unwrap();
        assert_eq!(params(&out), vec![1.0, 2.0]);
    }

    #[test]
    fn strictly_better_in_one_metric_keeps_candidate() {
        let names = ["rmse", "pbias"];
        let pool = vec![
            candidate(1.0, &names, &[0.9, 0.1]),
            candidate(2.0, &names, &[0.1, 0.2]),
        ];
        let out = non_dominated(pool);
        assert_eq!(params(&out), vec![1.0, 2.0]);
    }

    #[test]
    fn pareto_then_rank_by_single_metric() {
        let names = ["rmse", "pbias", "nse"];
        let pool = vec![
            candidate(1.0, &names, &[0.3, 5.0, -0.9]),
            candidate(2.0, &names, &[0.2, 9.0, -0.8]),
            candidate(3.0, &names, &[0.4, 6.0, -0.7]), // dominated by 1.0
            candidate(4.0, &names, &[0.1, 1.0, -0.95]),
        ];
        let out = select_best(pool, &criteria(&names, Some("pbias"), true, 2)).unwrap();
        // 1.0 and 2.0 are both dominated by 4.0 in every metric, leaving 4.0 alone.
        assert_eq!(params(&out), vec![4.0]);
    }

    #[test]
    fn rank_without_pareto_uses_whole_pool() {
        let names = ["rmse", "pbias"];
        let pool = vec![
            candidate(1.0, &names, &[0.3, 5.0]),
            candidate(2.0, &names, &[0.4, 6.0]),
            candidate(3.0, &names, &[0.1, 7.0]),
        ];
        let out = select_best(pool, &criteria(&names, Some("pbias"), false, 2)).unwrap();
        assert_eq!(params(&out), vec![1.0, 2.0]);
    }

    #[test]
    fn output_carries_raw_metrics() {
        let pool = vec![candidate(1.0, &["r2"], &[-0.8])];
        let out = select_best(pool, &criteria(&["r2"], None, true, 1)).unwrap();
        assert_eq!(out[0].metrics.get("r2"), Some(0.8));
        assert_eq!(out[0].simulated, vec![1.0; 3]);
    }

    #[test]
    fn nan_ranks_last() {
        let pool = vec![
            candidate(1.0, &["paired"], &[f64::NAN]),
            candidate(2.0, &["paired"], &[-0.2]),
        ];
        let out = select_best(pool, &criteria(&["paired"], None, true, 2)).unwrap();
        assert_eq!(params(&out), vec![2.0, 1.0]);
    }

    #[test]
    fn invalid_criteria_are_configuration_errors() {
        let names = ["rmse", "pbias"];
        let pool = || vec![candidate(1.0, &names, &[0.3, 5.0])];
        assert!(select_best(pool(), &criteria(&names, None, false, 1)).is_err());
        assert!(select_best(pool(), &criteria(&names, Some("nse"), true, 1)).is_err());
        assert!(select_best(pool(), &criteria(&names, None, true, 0)).is_err());
        assert!(select_best(pool(), &criteria(&["pbias", "rmse"], None, true, 1)).is_err());
    }
}
