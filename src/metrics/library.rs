//! Goodness-of-fit metrics comparing a simulated series to an observed one.
//!
//! Every metric takes `(simulated, observed)` and returns a scalar. Apart from
//! percent bias (which deliberately works on the overlapping prefix) they
//! assume equal lengths; the evaluator enforces that before calling them.

use crate::error::{CalibrationError, Result};
use crate::math::{ks_p_value, ks_statistic, mean, paired_t_p_value};

fn ensure_non_empty(metric: &str, simulated: &[f64], observed: &[f64]) -> Result<()> {
    if simulated.is_empty() || observed.is_empty() {
        return Err(CalibrationError::evaluation(metric, "Empty series."));
    }
    Ok(())
}

/// Coefficient of determination (squared Pearson correlation). 1 = perfect.
///
/// A constant simulated series has no correlation to speak of and scores NaN;
/// a constant observed series is an error.
pub fn r_squared(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("r2", simulated, observed)?;
    let mean_s = mean(simulated);
    let mean_o = mean(observed);
    let mut cov = 0.0;
    let mut var_s = 0.0;
    let mut var_o = 0.0;
    for (s, o) in simulated.iter().zip(observed) {
        cov += (s - mean_s) * (o - mean_o);
        var_s += (s - mean_s).powi(2);
        var_o += (o - mean_o).powi(2);
    }
    if var_o == 0.0 {
        return Err(CalibrationError::evaluation("r2", "Observed series is constant."));
    }
    if var_s == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(cov * cov / (var_s * var_o))
}

/// Percent bias over the overlapping prefix. 0 = unbiased, positive = overestimation.
pub fn percent_bias(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("pbias", simulated, observed)?;
    let len = simulated.len().min(observed.len());
    let sum_obs: f64 = observed[..len].iter().sum();
    if sum_obs == 0.0 {
        return Err(CalibrationError::evaluation(
            "pbias",
            "Observed values sum to zero.",
        ));
    }
    let diff: f64 = simulated[..len]
        .iter()
        .zip(&observed[..len])
        .map(|(s, o)| s - o)
        .sum();
    Ok(100.0 * diff / sum_obs)
}

/// Root-mean-square error. 0 = perfect.
pub fn rmse(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("rmse", simulated, observed)?;
    let n = simulated.len().min(observed.len()) as f64;
    let sse: f64 = simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s - o).powi(2))
        .sum();
    Ok((sse / n).sqrt())
}

/// Mean absolute error. 0 = perfect.
pub fn mae(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("mae", simulated, observed)?;
    let n = simulated.len().min(observed.len()) as f64;
    Ok(simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s - o).abs())
        .sum::<f64>()
        / n)
}

/// Two-sample Kolmogorov–Smirnov statistic. 0 = identical distributions.
pub fn ks_stat(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("ks_stat", simulated, observed)?;
    Ok(ks_statistic(simulated, observed))
}

/// p-value for the KS null hypothesis that both samples share a distribution.
pub fn ks_pval(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("ks_pval", simulated, observed)?;
    let d = ks_statistic(simulated, observed);
    Ok(ks_p_value(d, simulated.len(), observed.len()))
}

/// Paired-sample t-test p-value. Higher means less evidence of a systematic offset.
pub fn paired(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    paired_t_p_value(simulated, observed)
}

/// Nash–Sutcliffe efficiency. Range (-inf, 1], 1 = perfect.
pub fn nse(simulated: &[f64], observed: &[f64]) -> Result<f64> {
    ensure_non_empty("nse", simulated, observed)?;
    let mean_o = mean(observed);
    let numerator: f64 = simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s - o).powi(2))
        .sum();
    let denominator: f64 = observed.iter().map(|o| (o - mean_o).powi(2)).sum();
    if denominator == 0.0 {
        return Err(CalibrationError::evaluation("nse", "Observed series is constant."));
    }
    Ok(1.0 - numerator / denominator)
}

// Minimize transforms: lower is always better after these.

pub fn negate(value: f64) -> f64 {
    -value
}

pub fn absolute(value: f64) -> f64 {
    value.abs()
}

pub fn identity(value: f64) -> f64 {
    value
}
