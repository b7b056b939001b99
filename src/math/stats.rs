//! Small statistical building blocks used by the metric library.
//!
//! Numerical notes:
//! - The Kolmogorov survival function is summed until terms drop below
//!   `KS_TERM_EPS`; for tiny `λ` the series converges slowly, but there the
//!   p-value is 1 to double precision and we return that directly.
//! - Two-sample KS p-values are exact (lattice-path counting) while
//!   `n·m <= KS_EXACT_MAX_CELLS`; path counts stay well inside `f64` range
//!   there. Larger samples use the asymptotic distribution.
//! - Sample variances use the `n - 1` denominator.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{CalibrationError, Result};

const KS_TERM_EPS: f64 = 1e-12;
const KS_MAX_TERMS: usize = 100;
/// Below this `λ` the Kolmogorov survival function is 1 to double precision.
const KS_LAMBDA_FLOOR: f64 = 0.18;
const KS_EXACT_MAX_CELLS: usize = 10_000;

pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (`n - 1` denominator). Zero for fewer than two points.
pub fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0)
}

/// Copy of `xs` sorted ascending (NaN last).
pub fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Two-sample Kolmogorov–Smirnov statistic `sup |F_a(x) - F_b(x)|`.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let a = sorted(a);
    let b = sorted(b);
    let (n, m) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }
    d
}

/// Kolmogorov survival function `Q(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)`.
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < KS_LAMBDA_FLOOR {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=KS_MAX_TERMS {
        let k = k as f64;
        let term = sign * (-2.0 * k * k * lambda * lambda).exp();
        sum += term;
        if term.abs() < KS_TERM_EPS {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Two-sided p-value `P(D >= d)` for a two-sample KS statistic.
pub fn ks_p_value(d: f64, n: usize, m: usize) -> f64 {
    if n == 0 || m == 0 {
        return 1.0;
    }
    if n * m <= KS_EXACT_MAX_CELLS {
        ks_exact_p_value(d, n, m)
    } else {
        ks_asymptotic_p_value(d, n, m)
    }
}

/// Exact p-value: the share of the `C(n+m, n)` monotone lattice paths from
/// `(0, 0)` to `(n, m)` that leave the band `|i/n - j/m| < d`.
///
/// `d` is snapped to the lattice `1/lcm(n, m)` so boundary cases count as
/// outside.
pub fn ks_exact_p_value(d: f64, n: usize, m: usize) -> f64 {
    let g = gcd(n, m);
    let lcm = (n / g) * m;
    let h = (d * lcm as f64).round() as usize;
    if h == 0 {
        return 1.0;
    }
    // |i/n - j/m| < h/lcm  <=>  |i·m - j·n| < h·g
    let bound = h * g;

    let mut paths = vec![0.0f64; m + 1];
    for i in 0..=n {
        for j in 0..=m {
            if (i * m).abs_diff(j * n) >= bound {
                paths[j] = 0.0;
            } else if i == 0 && j == 0 {
                paths[j] = 1.0;
            } else {
                let from_left = if j > 0 { paths[j - 1] } else { 0.0 };
                let from_below = if i > 0 { paths[j] } else { 0.0 };
                paths[j] = from_left + from_below;
            }
        }
    }
    (1.0 - paths[m] / binomial(n + m, n)).clamp(0.0, 1.0)
}

/// Asymptotic p-value using the effective sample size `n·m/(n+m)` with
/// Stephens' correction.
pub fn ks_asymptotic_p_value(d: f64, n: usize, m: usize) -> f64 {
    let ne = (n * m) as f64 / (n + m) as f64;
    let sqrt_ne = ne.sqrt();
    kolmogorov_survival((sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Two-sided p-value of the paired t-test on `a - b`.
///
/// Zero spread in the differences gives p = 1 when they are all zero and
/// p = 0 otherwise.
pub fn paired_t_p_value(a: &[f64], b: &[f64]) -> Result<f64> {
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let n = diffs.len();
    if n < 2 {
        return Err(CalibrationError::evaluation(
            "paired",
            format!("Paired t-test needs at least 2 points, got {n}."),
        ));
    }

    let m = mean(&diffs);
    let var = sample_variance(&diffs);
    if var <= 0.0 {
        return Ok(if m == 0.0 { 1.0 } else { 0.0 });
    }

    let t = m / (var / n as f64).sqrt();
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| CalibrationError::evaluation("paired", format!("Student-t error: {e}")))?;
    Ok((2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
}
