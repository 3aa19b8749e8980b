//! Bayesian credible intervals for the POI.
//!
//! The marginal posterior is tabulated on `n_scan` equal bins spanning the POI
//! range. At each bin centre the nuisance parameters are integrated out with a
//! tensor-product Gauss-Legendre rule on a window of `± window_sigmas` around
//! the conditional mode, with widths taken from the inverse numerical Hessian
//! of the NLL (clipped to the parameter ranges). The posterior is piecewise
//! constant across a bin, so its CDF is piecewise linear.

use crate::profiler::{PoiConstraint, Profiler};
use lim_core::{Dataset, Error, ParameterPoint, Result, StatModel};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Largest number of nuisance dimensions integrated by quadrature.
pub const MAX_QUADRATURE_DIM: usize = 4;

/// Prior density on the POI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prior {
    /// Uniform over the POI range.
    Flat,
    /// `1 / sqrt(mu)`; the posterior grid is restricted to `mu >= 0`.
    InverseSqrt,
    /// Gaussian with the given centre and width.
    Normal {
        /// Centre.
        center: f64,
        /// Width (> 0).
        width: f64,
    },
}

impl Prior {
    /// Part of `[lo, hi]` where the prior is non-zero.
    pub fn support(&self, lo: f64, hi: f64) -> Result<(f64, f64)> {
        let (a, b) = match self {
            Prior::InverseSqrt => (lo.max(0.0), hi),
            _ => (lo, hi),
        };
        if b <= a {
            return Err(Error::Validation(format!("prior {self:?} vanishes on [{lo}, {hi}]")));
        }
        Ok((a, b))
    }

    /// Log of the mean prior density over `[a, b]`, up to a constant.
    ///
    /// The `1/sqrt(mu)` prior is integrated exactly so its singularity at 0
    /// is weighted correctly.
    pub fn log_bin_weight(&self, a: f64, b: f64) -> Result<f64> {
        match *self {
            Prior::Flat => Ok(0.0),
            Prior::InverseSqrt => Ok((2.0 * (b.sqrt() - a.max(0.0).sqrt()) / (b - a)).ln()),
            Prior::Normal { center, width } => lim_prob::normal::logpdf(0.5 * (a + b), center, width),
        }
    }
}

/// How the credible interval splits the excluded probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Equal probability in both tails.
    Central,
    /// Upper limit: all excluded probability in the right tail.
    Upper,
    /// Fraction `f` in `[0, 1]` of the excluded probability in the left tail.
    LeftTailFraction(f64),
    /// Highest-density region.
    Shortest,
}

/// Bayesian calculator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Credibility level.
    pub confidence_level: f64,
    /// Tail policy.
    pub tail: TailPolicy,
    /// POI prior.
    pub prior: Prior,
    /// Posterior bins across the POI range.
    pub n_scan: usize,
    /// Gauss-Legendre nodes per nuisance dimension.
    pub n_nodes: usize,
    /// Half-width of the integration window in posterior sigmas.
    pub window_sigmas: f64,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            tail: TailPolicy::Central,
            prior: Prior::Flat,
            n_scan: 500,
            n_nodes: 24,
            window_sigmas: 8.0,
        }
    }
}

/// A credible interval with the tabulated posterior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianInterval {
    /// Lower edge.
    pub lower: f64,
    /// Upper edge.
    pub upper: f64,
    /// Credibility level.
    pub confidence_level: f64,
    /// `(bin centre, normalized density)` pairs.
    pub posterior: Vec<(f64, f64)>,
}

/// Marginal-posterior interval constructor.
#[derive(Debug, Clone)]
pub struct BayesianCalculator {
    config: BayesianConfig,
}

impl BayesianCalculator {
    /// Calculator with validated settings.
    pub fn new(config: BayesianConfig) -> Result<Self> {
        let cl = config.confidence_level;
        if !(0.0 < cl && cl < 1.0) {
            return Err(Error::Validation(format!("confidence level must be in (0, 1), got {cl}")));
        }
        if config.n_scan < 2 || config.n_nodes == 0 {
            return Err(Error::Validation("n_scan must be >= 2 and n_nodes > 0".to_string()));
        }
        if !(config.window_sigmas > 0.0) {
            return Err(Error::Validation("window_sigmas must be > 0".to_string()));
        }
        if let TailPolicy::LeftTailFraction(f) = config.tail {
            if !(0.0..=1.0).contains(&f) {
                return Err(Error::Validation(format!("left tail fraction must be in [0, 1], got {f}")));
            }
        }
        if let Prior::Normal { width, .. } = config.prior {
            if !(width > 0.0) {
                return Err(Error::Validation("normal prior width must be > 0".to_string()));
            }
        }
        Ok(Self { config })
    }

    /// The configuration.
    pub fn config(&self) -> &BayesianConfig {
        &self.config
    }

    /// Credible interval on `data`; conditional modes start from `start`.
    pub fn interval(
        &self,
        profiler: &Profiler<'_>,
        data: &Dataset,
        start: &ParameterPoint,
    ) -> Result<BayesianInterval> {
        let model = profiler.model();
        let (poi_lo, poi_hi) = profiler.poi_bounds();
        let (lo, hi) = self.config.prior.support(poi_lo, poi_hi)?;
        let n = self.config.n_scan;
        let width = (hi - lo) / n as f64;
        let centers: Vec<f64> = (0..n).map(|i| lo + (i as f64 + 0.5) * width).collect();

        let rule = gauss_legendre(self.config.n_nodes);
        let log_post: Vec<Option<f64>> = centers
            .par_iter()
            .map(|&mu| -> Result<Option<f64>> {
                let half = 0.5 * width;
                let log_prior = self.config.prior.log_bin_weight(mu - half, mu + half)?;
                let log_like = self.log_marginal_likelihood(profiler, model, data, start, mu, &rule)?;
                Ok(Some(log_like + log_prior).filter(|v| v.is_finite()))
            })
            .collect::<Result<_>>()?;

        let max = log_post.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(Error::Computation("posterior vanishes on the whole POI range".to_string()));
        }
        let weights: Vec<f64> = log_post.iter().map(|v| v.map_or(0.0, |lp| (lp - max).exp())).collect();
        let total: f64 = weights.iter().sum();
        let mass: Vec<f64> = weights.iter().map(|w| w / total).collect();

        let cl = self.config.confidence_level;
        let (lower, upper) = match self.config.tail {
            TailPolicy::Central => tail_interval(&mass, lo, width, 0.5, cl),
            TailPolicy::Upper => tail_interval(&mass, lo, width, 0.0, cl),
            TailPolicy::LeftTailFraction(f) => tail_interval(&mass, lo, width, f, cl),
            TailPolicy::Shortest => shortest_interval(&mass, lo, width, cl),
        };
        log::debug!("bayesian interval CL={cl} ({:?}): [{lower}, {upper}]", self.config.tail);

        Ok(BayesianInterval {
            lower,
            upper,
            confidence_level: cl,
            posterior: centers.into_iter().zip(mass).map(|(c, m)| (c, m / width)).collect(),
        })
    }

    /// `ln ∫ L(mu, theta) dtheta` over the floating nuisance parameters.
    fn log_marginal_likelihood(
        &self,
        profiler: &Profiler<'_>,
        model: &dyn StatModel,
        data: &Dataset,
        start: &ParameterPoint,
        mu: f64,
        rule: &(Vec<f64>, Vec<f64>),
    ) -> Result<f64> {
        let mode = profiler.profile(data, start, PoiConstraint::Fixed(mu))?;
        if !mode.converged() {
            log::warn!("bayesian: conditional mode at mu={mu} did not converge ({:?})", mode.status);
        }
        let bounds = model.config().bounds();
        let poi = profiler.poi_index();
        let flags = mode.point.constant_flags();
        let dims: Vec<usize> = (0..bounds.len())
            .filter(|&i| i != poi && !flags[i] && bounds[i].0 < bounds[i].1)
            .collect();
        if dims.is_empty() {
            return Ok(-mode.nll);
        }
        if dims.len() > MAX_QUADRATURE_DIM {
            return Err(Error::NotImplemented(format!(
                "nuisance integration over {} dimensions (max {MAX_QUADRATURE_DIM})",
                dims.len()
            )));
        }

        let center = mode.point.values().to_vec();
        let sigmas = posterior_widths(model, data, &center, &dims, &bounds)?;
        let windows: Vec<(f64, f64)> = dims
            .iter()
            .zip(&sigmas)
            .map(|(&i, &s)| {
                let (plo, phi) = bounds[i];
                let half = self.config.window_sigmas * s;
                ((center[i] - half).max(plo), (center[i] + half).min(phi))
            })
            .collect();

        let (nodes, node_w) = rule;
        let k = nodes.len();
        let mut idx = vec![0usize; dims.len()];
        let mut params = center.clone();
        let mut sum = 0.0;
        loop {
            let mut w = 1.0;
            for (d, &i) in dims.iter().enumerate() {
                let (a, b) = windows[d];
                let half = 0.5 * (b - a);
                params[i] = 0.5 * (a + b) + half * nodes[idx[d]];
                w *= half * node_w[idx[d]];
            }
            let nll = model.nll(&params, data)?;
            if nll.is_finite() {
                sum += w * (mode.nll - nll).exp();
            }
            // Odometer step over the tensor grid.
            let mut d = 0;
            while d < idx.len() {
                idx[d] += 1;
                if idx[d] < k {
                    break;
                }
                idx[d] = 0;
                d += 1;
            }
            if d == idx.len() {
                break;
            }
        }
        if !(sum > 0.0) {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(sum.ln() - mode.nll)
    }
}

/// Posterior sigmas of the nuisance dimensions `dims` at `center`, from the
/// inverse of the numerical NLL Hessian. Falls back to a quarter of the
/// parameter range when the Hessian is not positive definite.
fn posterior_widths(
    model: &dyn StatModel,
    data: &Dataset,
    center: &[f64],
    dims: &[usize],
    bounds: &[(f64, f64)],
) -> Result<Vec<f64>> {
    let n = dims.len();
    let steps: Vec<f64> = dims.iter().map(|&i| 1e-4 * center[i].abs().max(1.0)).collect();
    // Keep the stencil inside the parameter range.
    let mut x0 = center.to_vec();
    for (&i, &e) in dims.iter().zip(&steps) {
        let (lo, hi) = bounds[i];
        if hi - lo > 2.0 * e {
            x0[i] = x0[i].clamp(lo + e, hi - e);
        }
    }
    let f = |shifts: &[(usize, f64)]| -> Result<f64> {
        let mut x = x0.clone();
        for &(i, s) in shifts {
            x[i] += s;
        }
        model.nll(&x, data)
    };

    let f0 = f(&[])?;
    let mut h = DMatrix::<f64>::zeros(n, n);
    for a in 0..n {
        let (ia, ea) = (dims[a], steps[a]);
        h[(a, a)] = (f(&[(ia, ea)])? - 2.0 * f0 + f(&[(ia, -ea)])?) / (ea * ea);
        for b in (a + 1)..n {
            let (ib, eb) = (dims[b], steps[b]);
            let v = (f(&[(ia, ea), (ib, eb)])? - f(&[(ia, ea), (ib, -eb)])?
                - f(&[(ia, -ea), (ib, eb)])?
                + f(&[(ia, -ea), (ib, -eb)])?)
                / (4.0 * ea * eb);
            h[(a, b)] = v;
            h[(b, a)] = v;
        }
    }

    let fallback = || dims.iter().map(|&i| 0.25 * (bounds[i].1 - bounds[i].0)).collect::<Vec<_>>();
    if h.iter().any(|v| !v.is_finite()) {
        return Ok(fallback());
    }
    let max_diag = (0..n).map(|i| h[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);
    let mut jitter = 1e-10 * max_diag;
    for attempt in 0..15 {
        let mut h_try = h.clone();
        if attempt > 0 {
            for i in 0..n {
                h_try[(i, i)] += jitter;
            }
        }
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_try) {
            let cov = chol.inverse();
            return Ok((0..n)
                .map(|i| {
                    let s = cov[(i, i)].sqrt();
                    let range = bounds[dims[i]].1 - bounds[dims[i]].0;
                    if s.is_finite() && s > 0.0 { s.min(range) } else { 0.25 * range }
                })
                .collect());
        }
        jitter *= 10.0;
    }
    log::debug!("bayesian: NLL Hessian not positive definite; using range-based widths");
    Ok(fallback())
}

/// Position where the piecewise-linear CDF of `mass` reaches `q`.
fn quantile(mass: &[f64], lo: f64, width: f64, q: f64) -> f64 {
    if q <= 0.0 {
        return lo;
    }
    let mut cum = 0.0;
    for (i, &m) in mass.iter().enumerate() {
        if m > 0.0 && cum + m >= q {
            return lo + width * (i as f64 + (q - cum) / m);
        }
        cum += m;
    }
    lo + width * mass.len() as f64
}

fn tail_interval(mass: &[f64], lo: f64, width: f64, left_fraction: f64, cl: f64) -> (f64, f64) {
    let excluded = 1.0 - cl;
    let lower = quantile(mass, lo, width, left_fraction * excluded);
    let upper = quantile(mass, lo, width, 1.0 - (1.0 - left_fraction) * excluded);
    (lower, upper)
}

/// Smallest set of highest-density bins holding `cl`, reported as its hull.
fn shortest_interval(mass: &[f64], lo: f64, width: f64, cl: f64) -> (f64, f64) {
    let mut order: Vec<usize> = (0..mass.len()).collect();
    order.sort_by(|&a, &b| mass[b].total_cmp(&mass[a]));
    let (mut first, mut last) = (usize::MAX, 0usize);
    let mut cum = 0.0;
    for i in order {
        cum += mass[i];
        first = first.min(i);
        last = last.max(i);
        if cum >= cl {
            break;
        }
    }
    (lo + width * first as f64, lo + width * (last + 1) as f64)
}

/// Gauss-Legendre nodes and weights on `[-1, 1]` (Newton iteration on `P_n`,
/// symmetric pairs).
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    if n == 1 {
        weights[0] = 2.0;
    }
    if n <= 1 {
        return (nodes, weights);
    }
    let nf = n as f64;
    // Returns (P_n(x), P'_n(x)).
    let legendre = |x: f64| {
        let (mut p0, mut p1) = (1.0, x);
        for j in 2..=n {
            let jf = j as f64;
            let p2 = ((2.0 * jf - 1.0) * x * p1 - (jf - 1.0) * p0) / jf;
            p0 = p1;
            p1 = p2;
        }
        (p1, nf * (x * p1 - p0) / (x * x - 1.0))
    };
    for i in 0..n.div_ceil(2) {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre(x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}
