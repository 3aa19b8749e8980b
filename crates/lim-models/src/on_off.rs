//! Signal region plus control region:
//! `Poisson(n_sr | mu * s + b) * Poisson(n_cr | tau * b)`.
//!
//! The control-region count is either a second observable or a global
//! observable carried by the parameter point.

use crate::sampling::{poisson_draw, poisson_nll, rng_from_seed};
use lim_core::{Dataset, Error, ModelConfig, ObservableSpec, ParameterSpec, Result, StatModel};

const MU: usize = 0;
const S: usize = 1;
const B: usize = 2;
const TAU: usize = 3;
const N_CR: usize = 4;

/// On/off counting model with a background nuisance constrained by a control region.
#[derive(Debug, Clone)]
pub struct OnOffCounting {
    config: ModelConfig,
    cr_global: bool,
}

impl OnOffCounting {
    /// `s = 10`, `tau = 10`, `b` in `[0, 200]` (start 20), `mu` in `[-1, 10]`.
    ///
    /// With `cr_global`, `n_cr` is a global observable fixed at `observed_cr`;
    /// otherwise it is the second dataset column.
    pub fn new(cr_global: bool, observed_cr: f64) -> Self {
        let mut parameters = vec![
            ParameterSpec::new("mu", 1.0, (-1.0, 10.0)),
            ParameterSpec::fixed("S", 10.0),
            ParameterSpec::new("B", 20.0, (0.0, 200.0)),
            ParameterSpec::fixed("tau", 10.0),
        ];
        let mut observables = vec![ObservableSpec::new("n_sr", (0.0, 100.0))];
        let mut global_observables = vec![];
        if cr_global {
            parameters.push(ParameterSpec::fixed("n_cr", observed_cr));
            global_observables.push("n_cr".to_string());
        } else {
            observables.push(ObservableSpec::new("n_cr", (0.0, 1000.0)));
        }
        let config = ModelConfig {
            name: "ModelConfig".to_string(),
            parameters,
            poi: vec!["mu".to_string()],
            nuisance: vec!["B".to_string()],
            observables,
            global_observables,
            snapshot: Some(vec![("mu".to_string(), 1.0)]),
        };
        Self { config, cr_global }
    }

    /// `true` if the control-region count is a global observable.
    pub fn cr_is_global(&self) -> bool {
        self.cr_global
    }

    /// Observed dataset. `n_cr` is ignored when it is a global observable.
    pub fn observed(&self, n_sr: f64, n_cr: f64) -> Result<Dataset> {
        if self.cr_global {
            Dataset::new(vec!["n_sr".to_string()], vec![vec![n_sr]])
        } else {
            Dataset::new(vec!["n_sr".to_string(), "n_cr".to_string()], vec![vec![n_sr, n_cr]])
        }
    }

    fn rates(params: &[f64]) -> (f64, f64) {
        (params[MU] * params[S] + params[B], params[TAU] * params[B])
    }
}

impl StatModel for OnOffCounting {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn nll(&self, params: &[f64], data: &Dataset) -> Result<f64> {
        let (lam_sr, lam_cr) = Self::rates(params);
        let mut total = 0.0;
        for (i, row) in data.rows().iter().enumerate() {
            let mut v = poisson_nll(row[0], lam_sr)?;
            if !self.cr_global {
                v += poisson_nll(row[1], lam_cr)?;
            }
            total += data.weight(i) * v;
        }
        if self.cr_global {
            total += poisson_nll(params[N_CR], lam_cr)?;
        }
        Ok(total)
    }

    fn expected_data(&self, params: &[f64]) -> Result<Dataset> {
        let (lam_sr, lam_cr) = Self::rates(params);
        self.observed(lam_sr.max(0.0), lam_cr.max(0.0))
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn generate(&self, params: &[f64], n_events: Option<usize>, seed: u64) -> Result<Dataset> {
        let n = n_events.ok_or_else(|| {
            Error::Validation("non-extended model needs an explicit event count".to_string())
        })?;
        let (lam_sr, lam_cr) = Self::rates(params);
        let mut rng = rng_from_seed(seed);
        let mut rows = Vec::with_capacity(n);
        for _ in 0..n {
            let n_sr = poisson_draw(lam_sr, &mut rng);
            if self.cr_global {
                rows.push(vec![n_sr]);
            } else {
                rows.push(vec![n_sr, poisson_draw(lam_cr, &mut rng)]);
            }
        }
        Dataset::new(self.config.observables.iter().map(|o| o.name.clone()).collect(), rows)
    }

    fn asimov_global_observables(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut out = params.to_vec();
        if self.cr_global {
            out[N_CR] = Self::rates(params).1;
        }
        Ok(out)
    }

    fn sample_global_observables(&self, params: &[f64], seed: u64) -> Result<Vec<f64>> {
        let mut out = params.to_vec();
        if self.cr_global {
            let mut rng = rng_from_seed(seed);
            out[N_CR] = poisson_draw(Self::rates(params).1, &mut rng);
        }
        Ok(out)
    }
}
