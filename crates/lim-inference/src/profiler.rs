//! Likelihood profiling over nuisance parameters.
//!
//! A profile fixes the POI (or lets it float for the unconditional fit),
//! floats every other non-constant parameter of the start point, and minimizes
//! the negative log-likelihood within the declared ranges. Constant parameters
//! and global observables keep the values of the start point.

use crate::optimizer::{LbfgsbOptimizer, Minimizer, ObjectiveFunction, OptimizerConfig};
use lim_core::{
    Dataset, Error, FitStatus, ParameterPoint, ProfileResult, Result, StatModel,
};
use serde::{Deserialize, Serialize};

/// How the POI is treated by a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoiConstraint {
    /// POI fixed at the given value (conditional fit).
    Fixed(f64),
    /// POI floats within its range (unconditional fit).
    Free,
}

/// Profiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Minimizer settings.
    pub optimizer: OptimizerConfig,
    /// Extra attempts from perturbed start values after a non-converged fit.
    pub max_retries: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self { optimizer: OptimizerConfig::default(), max_retries: 2 }
    }
}

/// NLL restricted to the floating parameters.
struct ProfileObjective<'a> {
    model: &'a dyn StatModel,
    data: &'a Dataset,
    template: Vec<f64>,
    free: &'a [usize],
}

impl ProfileObjective<'_> {
    fn expand(&self, x: &[f64]) -> Vec<f64> {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(x) {
            full[i] = v;
        }
        full
    }
}

impl ObjectiveFunction for ProfileObjective<'_> {
    fn eval(&self, x: &[f64]) -> Result<f64> {
        let v = self.model.nll(&self.expand(x), self.data)?;
        if v.is_nan() {
            return Err(Error::Computation("NLL evaluated to NaN".to_string()));
        }
        Ok(v)
    }
}

/// Profiles a model's likelihood at fixed or free POI values.
///
/// Holds no state between calls: every profile starts from the point it is given.
pub struct Profiler<'a> {
    model: &'a dyn StatModel,
    poi: usize,
    bounds: Vec<(f64, f64)>,
    minimizer: Box<dyn Minimizer + 'a>,
    max_retries: usize,
}

impl<'a> Profiler<'a> {
    /// Profiler backed by [`LbfgsbOptimizer`].
    pub fn new(model: &'a dyn StatModel, config: ProfilerConfig) -> Result<Self> {
        let minimizer = Box::new(LbfgsbOptimizer::new(config.optimizer));
        Self::with_minimizer(model, minimizer, config.max_retries)
    }

    /// Profiler backed by a custom minimizer.
    pub fn with_minimizer(
        model: &'a dyn StatModel,
        minimizer: Box<dyn Minimizer + 'a>,
        max_retries: usize,
    ) -> Result<Self> {
        let cfg = model.config();
        cfg.validate()?;
        let poi = cfg.poi_index()?;
        Ok(Self { model, poi, bounds: cfg.bounds(), minimizer, max_retries })
    }

    /// The profiled model.
    pub fn model(&self) -> &'a dyn StatModel {
        self.model
    }

    /// Index of the POI in model order.
    pub fn poi_index(&self) -> usize {
        self.poi
    }

    /// Declared POI range.
    pub fn poi_bounds(&self) -> (f64, f64) {
        self.bounds[self.poi]
    }

    /// Minimize `-ln L` on `data` from `start`.
    ///
    /// A non-converged minimization is returned with its status, never as an
    /// error; see [`Profiler::profile_or_fail`].
    pub fn profile(
        &self,
        data: &Dataset,
        start: &ParameterPoint,
        poi: PoiConstraint,
    ) -> Result<ProfileResult> {
        self.model.config().check_point(start)?;

        let mut template = start.values().to_vec();
        let constant = start.constant_flags();
        let free: Vec<usize> = (0..template.len())
            .filter(|&i| {
                let (lo, hi) = self.bounds[i];
                let floating = !constant[i] && lo < hi;
                if i == self.poi {
                    floating && matches!(poi, PoiConstraint::Free)
                } else {
                    floating
                }
            })
            .collect();
        if let PoiConstraint::Fixed(mu) = poi {
            if !mu.is_finite() {
                return Err(Error::Validation(format!("fixed POI value must be finite, got {mu}")));
            }
            template[self.poi] = mu;
        }
        let poi_floats = free.contains(&self.poi);
        if poi_floats {
            let (lo, hi) = self.bounds[self.poi];
            template[self.poi] = template[self.poi].clamp(lo, hi);
        }

        let bounds: Vec<(f64, f64)> = free.iter().map(|&i| self.bounds[i]).collect();
        let objective = ProfileObjective { model: self.model, data, template, free: &free };
        let init: Vec<f64> = free.iter().map(|&i| objective.template[i]).collect();

        let mut best = self.minimizer.minimize(&objective, &init, &bounds)?;
        let mut n_iter = best.n_iter;
        let mut n_fev = best.n_fev;

        let mut attempt = 0;
        while !best.converged() && attempt < self.max_retries {
            attempt += 1;
            let perturbed = perturb(&init, &bounds, attempt);
            log::debug!("profile retry {attempt} from perturbed start (previous {:?})", best.status);
            let r = self.minimizer.minimize(&objective, &perturbed, &bounds)?;
            n_iter += r.n_iter;
            n_fev += r.n_fev;
            let better = match (r.converged(), best.converged()) {
                (true, false) => true,
                (false, true) => false,
                _ => r.fval < best.fval,
            };
            if better {
                best = r;
            }
        }

        if !best.converged() {
            log::warn!(
                "profile did not converge ({:?}) at {:?}; keeping best point fval={}",
                best.status,
                poi,
                best.fval
            );
        }

        let at_boundary = free.iter().zip(&best.parameters).any(|(&i, &v)| {
            let (lo, hi) = self.bounds[i];
            let tol = 1e-8 * (hi - lo).max(1.0);
            v <= lo + tol || v >= hi - tol
        });
        let full = objective.expand(&best.parameters);
        let point = start.with_values(full)?;
        let poi_value = point.values()[self.poi];

        Ok(ProfileResult {
            poi_value,
            point,
            nll: best.fval,
            status: best.status,
            at_boundary,
            n_iter,
            n_fev,
        })
    }

    /// [`Profiler::profile`], turning a non-converged result into
    /// [`Error::ConvergenceFailure`].
    pub fn profile_or_fail(
        &self,
        data: &Dataset,
        start: &ParameterPoint,
        poi: PoiConstraint,
        context: &str,
    ) -> Result<ProfileResult> {
        let r = self.profile(data, start, poi)?;
        match r.status {
            FitStatus::Converged => Ok(r),
            _ => Err(Error::ConvergenceFailure {
                context: format!("{context} ({:?})", r.status),
                fval: r.nll,
                parameters: r.point.values().to_vec(),
            }),
        }
    }
}

/// Deterministic start perturbation: shift each parameter by a growing
/// fraction of its range, alternating direction across parameters.
fn perturb(init: &[f64], bounds: &[(f64, f64)], attempt: usize) -> Vec<f64> {
    init.iter()
        .zip(bounds)
        .enumerate()
        .map(|(k, (&x, &(lo, hi)))| {
            let sign = if (k + attempt) % 2 == 0 { 1.0 } else { -1.0 };
            let step = 0.1 * attempt as f64 * (hi - lo);
            let y = x + sign * step;
            if y < lo || y > hi {
                (x - sign * step).clamp(lo, hi)
            } else {
                y
            }
        })
        .collect()
}
