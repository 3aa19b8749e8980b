//! Extended unbinned model: a Gaussian peak over an exponential background.
//!
//! `L = Poisson(N | nu_s + nu_b) * prod_i [nu_s * G(m_i) + nu_b * E(m_i)] / (nu_s + nu_b)`
//! with `nu_s = mu * s_nom`, `nu_b = b_nom`, both shapes normalized on the
//! observable range. Asimov data is a weighted binned dataset.

use crate::sampling::{normal_draw, poisson_draw, rng_from_seed};
use lim_core::{Dataset, Error, ModelConfig, ObservableSpec, ParameterSpec, Result, StatModel};
use lim_prob::{exponential, normal};
use rand::Rng;

const MU: usize = 0;
const S_NOM: usize = 1;
const B_NOM: usize = 2;
const ALPHA: usize = 3;
const MEAN: usize = 4;
const WIDTH: usize = 5;

const DENSITY_FLOOR: f64 = 1e-300;
const MAX_REJECTIONS: usize = 10_000;

/// Diphoton-style mass peak on `[lo, hi]`.
#[derive(Debug, Clone)]
pub struct MassPeakModel {
    config: ModelConfig,
    range: (f64, f64),
    n_asimov_bins: usize,
}

impl MassPeakModel {
    /// `m` in `[40, 400]`, peak at 125 with width 3, `s_nom = 50`, `b_nom = 10000`,
    /// `alpha` in `[-10, 0]` (start -0.01), `mu` in `[-3, 6]`.
    pub fn new() -> Self {
        let range = (40.0, 400.0);
        let config = ModelConfig {
            name: "ModelConfig".to_string(),
            parameters: vec![
                ParameterSpec::new("mu", 1.0, (-3.0, 6.0)),
                ParameterSpec::fixed("Snom", 50.0),
                ParameterSpec::fixed("Bnom", 10_000.0),
                ParameterSpec::new("alpha", -0.01, (-10.0, 0.0)),
                ParameterSpec::fixed("mean", 125.0),
                ParameterSpec::fixed("width", 3.0),
            ],
            poi: vec!["mu".to_string()],
            nuisance: vec!["alpha".to_string()],
            observables: vec![ObservableSpec::new("mgg", range)],
            global_observables: vec![],
            snapshot: Some(vec![("mu".to_string(), 1.0)]),
        };
        Self { config, range, n_asimov_bins: 180 }
    }

    /// Number of bins used for Asimov datasets.
    pub fn with_asimov_bins(mut self, n: usize) -> Self {
        self.n_asimov_bins = n.max(1);
        self
    }

    fn yields(params: &[f64]) -> (f64, f64) {
        (params[MU] * params[S_NOM], params[B_NOM])
    }

    fn density(&self, params: &[f64], m: f64) -> Result<f64> {
        let (lo, hi) = self.range;
        let (nu_s, nu_b) = Self::yields(params);
        let g = normal::truncated_logpdf(m, params[MEAN], params[WIDTH], lo, hi)?.exp();
        let e = exponential::logpdf(m, params[ALPHA], lo, hi)?.exp();
        Ok(nu_s * g + nu_b * e)
    }

    fn bin_fractions(params: &[f64], a: f64, b: f64, range: (f64, f64)) -> Result<(f64, f64)> {
        let (lo, hi) = range;
        let (mean, width) = (params[MEAN], params[WIDTH]);
        let g_total = normal::cdf((hi - mean) / width) - normal::cdf((lo - mean) / width);
        let g = (normal::cdf((b - mean) / width) - normal::cdf((a - mean) / width)) / g_total;
        let ln_z = exponential::log_norm(params[ALPHA], lo, hi)?;
        let e = (exponential::log_norm(params[ALPHA], a, b)? - ln_z).exp();
        Ok((g, e))
    }
}

impl Default for MassPeakModel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatModel for MassPeakModel {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn nll(&self, params: &[f64], data: &Dataset) -> Result<f64> {
        let (nu_s, nu_b) = Self::yields(params);
        let mut total = nu_s + nu_b;
        for (i, row) in data.rows().iter().enumerate() {
            let d = self.density(params, row[0])?;
            total -= data.weight(i) * d.max(DENSITY_FLOOR).ln();
        }
        Ok(total)
    }

    fn expected_data(&self, params: &[f64]) -> Result<Dataset> {
        let (lo, hi) = self.range;
        let (nu_s, nu_b) = Self::yields(params);
        let n = self.n_asimov_bins;
        let h = (hi - lo) / n as f64;
        let mut rows = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for k in 0..n {
            let a = lo + k as f64 * h;
            let b = a + h;
            let (g, e) = Self::bin_fractions(params, a, b, self.range)?;
            rows.push(vec![0.5 * (a + b)]);
            weights.push((nu_s * g + nu_b * e).max(0.0));
        }
        Dataset::weighted(vec!["mgg".to_string()], rows, weights)
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn generate(&self, params: &[f64], n_events: Option<usize>, seed: u64) -> Result<Dataset> {
        let (lo, hi) = self.range;
        let (nu_s, nu_b) = Self::yields(params);
        if nu_s < 0.0 {
            return Err(Error::Validation(format!(
                "cannot generate with negative signal yield {nu_s}"
            )));
        }
        let mut rng = rng_from_seed(seed);
        let n = match n_events {
            Some(n) => n,
            None => poisson_draw(nu_s + nu_b, &mut rng) as usize,
        };
        let f_sig = nu_s / (nu_s + nu_b);
        let mut rows = Vec::with_capacity(n);
        for _ in 0..n {
            let m = if rng.gen::<f64>() < f_sig {
                let mut x = params[MEAN];
                for _ in 0..MAX_REJECTIONS {
                    x = normal_draw(params[MEAN], params[WIDTH], &mut rng);
                    if (lo..=hi).contains(&x) {
                        break;
                    }
                }
                x.clamp(lo, hi)
            } else {
                exponential::inverse_cdf(rng.gen::<f64>(), params[ALPHA], lo, hi)?
            };
            rows.push(vec![m]);
        }
        Dataset::new(vec!["mgg".to_string()], rows)
    }
}
