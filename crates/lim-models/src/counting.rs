//! Single-bin counting experiment: `Poisson(n | mu * s + b)`.
//!
//! Signal and background yields are constants; `mu` is the only floating
//! parameter. The model is not extended: one entry is one observed count.

use crate::sampling::{poisson_draw, poisson_nll, rng_from_seed};
use lim_core::{Dataset, Error, ModelConfig, ObservableSpec, ParameterSpec, Result, StatModel};

/// Poisson counting model with known signal and background yields.
#[derive(Debug, Clone)]
pub struct PoissonCounting {
    config: ModelConfig,
    poi: usize,
    s: usize,
    b: usize,
}

impl PoissonCounting {
    /// Default configuration: `s = 10`, `b = 20`, `mu` in `[-1, 10]` (start 1),
    /// observable `n` in `[0, 100]`.
    pub fn new() -> Self {
        Self::build(10.0, 20.0, (-1.0, 10.0))
    }

    /// Counting model with the given yields and POI range.
    pub fn with_yields(signal: f64, background: f64, mu_bounds: (f64, f64)) -> Result<Self> {
        if !(signal.is_finite() && background.is_finite()) || background < 0.0 {
            return Err(Error::Validation(format!(
                "invalid yields: signal={signal}, background={background}"
            )));
        }
        if !(mu_bounds.0 < mu_bounds.1) {
            return Err(Error::Validation(format!("invalid POI range {mu_bounds:?}")));
        }
        let model = Self::build(signal, background, mu_bounds);
        model.config.validate()?;
        Ok(model)
    }

    fn build(signal: f64, background: f64, mu_bounds: (f64, f64)) -> Self {
        let init = 1.0_f64.clamp(mu_bounds.0, mu_bounds.1.max(mu_bounds.0));
        let config = ModelConfig {
            name: "ModelConfig".to_string(),
            parameters: vec![
                ParameterSpec::new("mu", init, mu_bounds),
                ParameterSpec::fixed("S", signal),
                ParameterSpec::fixed("B", background),
            ],
            poi: vec!["mu".to_string()],
            nuisance: vec![],
            observables: vec![ObservableSpec::new("n", (0.0, 100.0))],
            global_observables: vec![],
            snapshot: Some(vec![("mu".to_string(), init)]),
        };
        Self { config, poi: 0, s: 1, b: 2 }
    }

    /// Single-entry dataset with `n` observed events.
    pub fn observed(&self, n: f64) -> Result<Dataset> {
        Dataset::new(vec!["n".to_string()], vec![vec![n]])
    }

    fn expected_count(&self, params: &[f64]) -> f64 {
        params[self.poi] * params[self.s] + params[self.b]
    }
}

impl Default for PoissonCounting {
    fn default() -> Self {
        Self::new()
    }
}

impl StatModel for PoissonCounting {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn nll(&self, params: &[f64], data: &Dataset) -> Result<f64> {
        let lam = self.expected_count(params);
        let mut total = 0.0;
        for (i, row) in data.rows().iter().enumerate() {
            total += data.weight(i) * poisson_nll(row[0], lam)?;
        }
        Ok(total)
    }

    fn expected_data(&self, params: &[f64]) -> Result<Dataset> {
        self.observed(self.expected_count(params).max(0.0))
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn generate(&self, params: &[f64], n_events: Option<usize>, seed: u64) -> Result<Dataset> {
        let n = n_events.ok_or_else(|| {
            Error::Validation("non-extended model needs an explicit event count".to_string())
        })?;
        let lam = self.expected_count(params);
        let mut rng = rng_from_seed(seed);
        let rows = (0..n).map(|_| vec![poisson_draw(lam, &mut rng)]).collect();
        Dataset::new(vec!["n".to_string()], rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn nll_minimum_at_observed_rate() {
        let m = PoissonCounting::new();
        let d = m.observed(25.0).unwrap();
        let at = |mu: f64| m.nll(&[mu, 10.0, 20.0], &d).unwrap();
        assert!(at(0.5) < at(0.4));
        assert!(at(0.5) < at(0.6));
    }

    #[test]
    fn asimov_is_expected_count() {
        let m = PoissonCounting::new();
        let a = m.expected_data(&[0.0, 10.0, 20.0]).unwrap();
        assert_relative_eq!(a.single_value(0).unwrap(), 20.0);
    }

    #[test]
    fn generate_requires_event_count() {
        let m = PoissonCounting::new();
        assert!(m.generate(&[1.0, 10.0, 20.0], None, 1).is_err());
        let d = m.generate(&[1.0, 10.0, 20.0], Some(3), 1).unwrap();
        assert_eq!(d.n_entries(), 3);
    }
}
