//! Candidate generation over user bounds.
//!
//! Each spec yields a value list (evenly spaced, or uniform random draws); the
//! lists are combined as a Cartesian product in which the first spec varies
//! fastest. The same specs and seed always give the same candidates.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};

use crate::domain::{ParameterSet, ParameterSpec};
use crate::error::{CalibrationError, Result};

/// Decimal places kept when values are sent to the simulator.
pub const TRANSMIT_DECIMALS: i32 = 3;

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
///
/// A single step yields `[min]`; zero steps yield nothing.
pub fn lin_space(min: f64, max: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (steps as f64 - 1.0);
            (0..steps).map(|k| k as f64 * step + min).collect()
        }
    }
}

/// Round a value to the precision the simulator is given.
pub fn round_for_transmission(value: f64) -> f64 {
    let scale = 10f64.powi(TRANSMIT_DECIMALS);
    (value * scale).round() / scale
}

/// Candidate generator with its own random source.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    rng: StdRng,
}

impl ParameterSpace {
    /// Reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Generate every candidate for `specs`.
    ///
    /// All specs are validated before any value is drawn.
    pub fn generate(&mut self, specs: &[ParameterSpec]) -> Result<Vec<ParameterSet>> {
        if specs.is_empty() {
            return Err(CalibrationError::configuration("No parameters to generate."));
        }
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(CalibrationError::configuration(format!(
                    "Duplicate parameter name '{}'.",
                    spec.name
                )));
            }
        }

        let lists: Vec<Vec<f64>> = specs.iter().map(|spec| self.values_for(spec)).collect();
        let combos = index_product(&lists.iter().map(Vec::len).collect::<Vec<_>>());

        Ok(combos
            .into_iter()
            .map(|idx| {
                let mut set = ParameterSet::new();
                for (i, spec) in specs.iter().enumerate() {
                    set.push(spec.name.clone(), lists[i][idx[i]]);
                }
                set
            })
            .collect())
    }

    /// Value list for one (already validated) spec.
    pub fn values_for(&mut self, spec: &ParameterSpec) -> Vec<f64> {
        if spec.randomized {
            let dist = Uniform::new_inclusive(spec.min, spec.max);
            (0..spec.count).map(|_| dist.sample(&mut self.rng)).collect()
        } else {
            lin_space(spec.min, spec.max, spec.count)
        }
    }
}

/// All index tuples over lists of the given lengths, first position fastest.
fn index_product(lengths: &[usize]) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = vec![Vec::new()];
    for &len in lengths {
        let mut next = Vec::with_capacity(out.len() * len);
        for k in 0..len {
            for prefix in &out {
                let mut combo = prefix.clone();
                combo.push(k);
                next.push(combo);
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lin_space_includes_endpoints() {
        let v = lin_space(0.01, 0.1, 10);
        assert_eq!(v.len(), 10);
        assert_relative_eq!(v[0], 0.01);
        assert_relative_eq!(v[9], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn lin_space_single_step_is_min() {
        assert_eq!(lin_space(0.02, 0.08, 1), vec![0.02]);
        assert!(lin_space(0.02, 0.08, 0).is_empty());
    }

    #[test]
    fn deterministic_values_are_increasing_with_exact_count() {
        let mut space = ParameterSpace::seeded(1);
        for &(min, max, count) in &[(0.01, 0.1, 2), (0.02, 0.05, 7), (-5.0, 0.0, 25)] {
            let spec = ParameterSpec::new("n", min, max, count);
            let sets = space.generate(&[spec]).unwrap();
            let values: Vec<f64> = sets.iter().map(|s| s.get("n").unwrap()).collect();
            assert_eq!(values.len(), count);
            assert_relative_eq!(values[0], min);
            assert_relative_eq!(values[count - 1], max, epsilon = 1e-12);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn randomized_values_stay_in_bounds() {
        let mut space = ParameterSpace::seeded(42);
        let spec = ParameterSpec::new("n", 0.02, 0.06, 200).randomized(true);
        let sets = space.generate(&[spec]).unwrap();
        assert_eq!(sets.len(), 200);
        for set in &sets {
            let v = set.get("n").unwrap();
            assert!((0.02..=0.06).contains(&v), "{v} out of bounds");
        }
    }

    #[test]
    fn same_seed_same_candidates() {
        let spec = ParameterSpec::new("n", 0.02, 0.06, 5).randomized(true);
        let a = ParameterSpace::seeded(7).generate(&[spec.clone()]).unwrap();
        let b = ParameterSpace::seeded(7).generate(&[spec]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cartesian_product_varies_first_parameter_fastest() {
        let mut space = ParameterSpace::seeded(0);
        let specs = [
            ParameterSpec::new("a", 1.0, 3.0, 3),
            ParameterSpec::new("b", 10.0, 20.0, 2),
        ];
        let sets = space.generate(&specs).unwrap();
        let pairs: Vec<(f64, f64)> = sets
            .iter()
            .map(|s| (s.get("a").unwrap(), s.get("b").unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (1.0, 10.0),
                (2.0, 10.0),
                (3.0, 10.0),
                (1.0, 20.0),
                (2.0, 20.0),
                (3.0, 20.0)
            ]
        );
        assert_eq!(sets[0].names(), vec!["a", "b"]);
    }

    #[test]
    fn malformed_specs_are_rejected_before_generation() {
        let mut space = ParameterSpace::seeded(0);
        assert!(space.generate(&[]).is_err());
        assert!(space
            .generate(&[ParameterSpec::new("n", 0.1, 0.1, 5)])
            .is_err());
        assert!(space
            .generate(&[
                ParameterSpec::new("n", 0.01, 0.1, 5),
                ParameterSpec::new("n", 0.2, 0.3, 5),
            ])
            .is_err());
    }

    #[test]
    fn transmission_rounding_keeps_three_places() {
        assert_relative_eq!(round_for_transmission(0.034_49), 0.034);
        assert_relative_eq!(round_for_transmission(0.034_51), 0.035);
        assert_relative_eq!(round_for_transmission(0.1), 0.1);
    }
}
