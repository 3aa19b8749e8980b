//! Counting model with a Gaussian-constrained background uncertainty:
//! `Poisson(n | mu * s + b_nom + alpha * sigma_b) * Gauss(alpha_nom | alpha, 1)`.

use crate::sampling::{normal_draw, poisson_draw, poisson_nll, rng_from_seed};
use lim_core::{Dataset, Error, ModelConfig, ObservableSpec, ParameterSpec, Result, StatModel};

const MU: usize = 0;
const S: usize = 1;
const B_NOM: usize = 2;
const B_SYST: usize = 3;
const ALPHA: usize = 4;
const ALPHA_NOM: usize = 5;

/// Counting model whose background is `b_nom + alpha * sigma_b`, `alpha ~ N(alpha_nom, 1)`.
#[derive(Debug, Clone)]
pub struct GaussConstrainedCounting {
    config: ModelConfig,
}

impl GaussConstrainedCounting {
    /// `s = 10`, `b_nom = 20`, `sigma_b = 4`, `alpha` in `[-5, 5]`, `alpha_nom = 0`.
    pub fn new() -> Self {
        let config = ModelConfig {
            name: "ModelConfig".to_string(),
            parameters: vec![
                ParameterSpec::new("mu", 1.0, (-1.0, 10.0)),
                ParameterSpec::fixed("S", 10.0),
                ParameterSpec::fixed("B_nom", 20.0),
                ParameterSpec::fixed("B_systerr", 4.0),
                ParameterSpec::new("alpha_B", 0.0, (-5.0, 5.0)),
                ParameterSpec::fixed("alphaB_nom", 0.0),
            ],
            poi: vec!["mu".to_string()],
            nuisance: vec!["alpha_B".to_string()],
            observables: vec![ObservableSpec::new("n_sr", (0.0, 100.0))],
            global_observables: vec!["alphaB_nom".to_string()],
            snapshot: Some(vec![("mu".to_string(), 1.0)]),
        };
        Self { config }
    }

    /// Single-entry dataset.
    pub fn observed(&self, n_sr: f64) -> Result<Dataset> {
        Dataset::new(vec!["n_sr".to_string()], vec![vec![n_sr]])
    }

    fn rate(params: &[f64]) -> f64 {
        params[MU] * params[S] + params[B_NOM] + params[ALPHA] * params[B_SYST]
    }
}

impl Default for GaussConstrainedCounting {
    fn default() -> Self {
        Self::new()
    }
}

impl StatModel for GaussConstrainedCounting {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn nll(&self, params: &[f64], data: &Dataset) -> Result<f64> {
        let lam = Self::rate(params);
        let mut total = 0.0;
        for (i, row) in data.rows().iter().enumerate() {
            total += data.weight(i) * poisson_nll(row[0], lam)?;
        }
        total += lim_prob::normal::nll(params[ALPHA_NOM], params[ALPHA], 1.0)?;
        Ok(total)
    }

    fn expected_data(&self, params: &[f64]) -> Result<Dataset> {
        self.observed(Self::rate(params).max(0.0))
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn generate(&self, params: &[f64], n_events: Option<usize>, seed: u64) -> Result<Dataset> {
        let n = n_events.ok_or_else(|| {
            Error::Validation("non-extended model needs an explicit event count".to_string())
        })?;
        let lam = Self::rate(params);
        let mut rng = rng_from_seed(seed);
        let rows = (0..n).map(|_| vec![poisson_draw(lam, &mut rng)]).collect();
        Dataset::new(vec!["n_sr".to_string()], rows)
    }

    fn asimov_global_observables(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut out = params.to_vec();
        out[ALPHA_NOM] = params[ALPHA];
        Ok(out)
    }

    fn sample_global_observables(&self, params: &[f64], seed: u64) -> Result<Vec<f64>> {
        let mut out = params.to_vec();
        let mut rng = rng_from_seed(seed);
        out[ALPHA_NOM] = normal_draw(params[ALPHA], 1.0, &mut rng);
        Ok(out)
    }
}
