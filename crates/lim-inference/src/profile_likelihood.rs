//! Profile likelihood scans and intervals.
//!
//! The interval is the set of POI values with
//! `nll(mu) - nll(mu_hat) <= chi2_1^-1(CL) / 2` (two-sided statistic, Wilks).
//! No calculator and no toys are involved.

use crate::profiler::{PoiConstraint, Profiler};
use crate::test_statistic::{self, Sidedness};
use lim_core::{Dataset, Error, ParameterPoint, Result};
use serde::{Deserialize, Serialize};

/// Single point in a profile likelihood scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Tested POI value.
    pub mu: f64,
    /// Test statistic value.
    pub t: f64,
    /// Conditional NLL at `mu`.
    pub nll_mu: f64,
    /// Conditional fit convergence.
    pub converged: bool,
    /// Conditional fit iterations.
    pub n_iter: u64,
}

/// Profile likelihood scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileLikelihoodScan {
    /// Unconditional best-fit POI value.
    pub mu_hat: f64,
    /// Unconditional NLL at the global minimum.
    pub nll_hat: f64,
    /// Per-point results.
    pub points: Vec<ProfilePoint>,
}

/// Profile the likelihood at each of `mu_values`.
///
/// Consecutive conditional fits warm-start from the previous converged point.
pub fn scan(
    profiler: &Profiler<'_>,
    data: &Dataset,
    start: &ParameterPoint,
    mu_values: &[f64],
    sidedness: Sidedness,
) -> Result<ProfileLikelihoodScan> {
    let free = profiler.profile_or_fail(data, start, PoiConstraint::Free, "unconditional fit")?;
    let mu_hat = free.poi_value;
    let nll_hat = free.nll;

    let mut warm = free.point.clone();
    let mut points = Vec::with_capacity(mu_values.len());
    for &mu in mu_values {
        let fixed = profiler.profile(data, &warm, PoiConstraint::Fixed(mu))?;
        if fixed.converged() {
            warm = fixed.point.clone();
        } else {
            log::warn!("profile scan: conditional fit did not converge at mu={mu} ({:?})", fixed.status);
        }
        points.push(ProfilePoint {
            mu,
            t: test_statistic::ratio(sidedness, fixed.nll, nll_hat, mu_hat, mu),
            nll_mu: fixed.nll,
            converged: fixed.converged(),
            n_iter: fixed.n_iter,
        });
    }

    Ok(ProfileLikelihoodScan { mu_hat, nll_hat, points })
}

/// How an interval edge was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStatus {
    /// The likelihood crosses the threshold inside the POI range.
    Found,
    /// No crossing inside the range; the edge is the range bound.
    AtBoundary,
}

/// A profile likelihood interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodInterval {
    /// Confidence level.
    pub confidence_level: f64,
    /// Unconditional best-fit POI value.
    pub mu_hat: f64,
    /// Unconditional NLL.
    pub nll_hat: f64,
    /// Lower edge.
    pub lower: f64,
    /// Upper edge.
    pub upper: f64,
    /// How the lower edge was found.
    pub lower_status: LimitStatus,
    /// How the upper edge was found.
    pub upper_status: LimitStatus,
}

/// Profile likelihood interval constructor.
#[derive(Debug, Clone)]
pub struct ProfileLikelihoodCalculator {
    confidence_level: f64,
    rtol: f64,
}

impl ProfileLikelihoodCalculator {
    /// Calculator at `confidence_level` in (0, 1).
    pub fn new(confidence_level: f64) -> Result<Self> {
        if !(0.0 < confidence_level && confidence_level < 1.0) {
            return Err(Error::Validation(format!(
                "confidence level must be in (0, 1), got {confidence_level}"
            )));
        }
        Ok(Self { confidence_level, rtol: 1e-6 })
    }

    /// Override the relative tolerance of the edge bisection.
    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    /// `Δnll` threshold for the configured confidence level.
    pub fn threshold(&self) -> Result<f64> {
        Ok(0.5 * lim_prob::chi2::quantile(self.confidence_level, 1.0)?)
    }

    /// Interval on `data`, starting every fit from `start`.
    pub fn interval(
        &self,
        profiler: &Profiler<'_>,
        data: &Dataset,
        start: &ParameterPoint,
    ) -> Result<LikelihoodInterval> {
        let free = profiler.profile_or_fail(data, start, PoiConstraint::Free, "unconditional fit")?;
        let (lo, hi) = profiler.poi_bounds();
        let threshold = self.threshold()?;
        let step = 0.1 * (hi - lo);

        let excess = |mu: f64, warm: &ParameterPoint| -> Result<(f64, ParameterPoint)> {
            let r = profiler.profile_or_fail(
                data,
                warm,
                PoiConstraint::Fixed(mu),
                &format!("conditional fit at mu={mu}"),
            )?;
            Ok((r.nll - free.nll - threshold, r.point))
        };

        let (lower, lower_status) = self.edge(&excess, &free.point, free.poi_value, lo, step)?;
        let (upper, upper_status) = self.edge(&excess, &free.point, free.poi_value, hi, step)?;
        log::debug!(
            "PL interval CL={}: [{lower}, {upper}] mu_hat={} ({lower_status:?}, {upper_status:?})",
            self.confidence_level,
            free.poi_value
        );

        Ok(LikelihoodInterval {
            confidence_level: self.confidence_level,
            mu_hat: free.poi_value,
            nll_hat: free.nll,
            lower,
            upper,
            lower_status,
            upper_status,
        })
    }

    /// Step from `mu_hat` towards `limit` until the excess turns non-negative,
    /// then bisect the last step.
    fn edge<F>(
        &self,
        excess: &F,
        free_point: &ParameterPoint,
        mu_hat: f64,
        limit: f64,
        step: f64,
    ) -> Result<(f64, LimitStatus)>
    where
        F: Fn(f64, &ParameterPoint) -> Result<(f64, ParameterPoint)>,
    {
        let dir = if limit >= mu_hat { 1.0 } else { -1.0 };
        let mut inner = mu_hat;
        let mut warm = free_point.clone();
        loop {
            if (limit - inner) * dir <= 0.0 {
                return Ok((limit, LimitStatus::AtBoundary));
            }
            let outer = if dir > 0.0 { (inner + step).min(limit) } else { (inner - step).max(limit) };
            let (f, point) = excess(outer, &warm)?;
            if f >= 0.0 {
                return Ok((self.bisect(excess, &warm, inner, outer)?, LimitStatus::Found));
            }
            inner = outer;
            warm = point;
        }
    }

    /// Root of the excess between `inside` (excess < 0) and `outside` (excess >= 0).
    fn bisect<F>(&self, excess: &F, warm: &ParameterPoint, mut inside: f64, mut outside: f64) -> Result<f64>
    where
        F: Fn(f64, &ParameterPoint) -> Result<(f64, ParameterPoint)>,
    {
        for _ in 0..200 {
            if (outside - inside).abs() <= self.rtol * outside.abs().max(1.0) {
                break;
            }
            let mid = 0.5 * (inside + outside);
            let (f, _) = excess(mid, warm)?;
            if f >= 0.0 {
                outside = mid;
            } else {
                inside = mid;
            }
        }
        Ok(0.5 * (inside + outside))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ProfilerConfig;
    use approx::assert_relative_eq;
    use lim_core::StatModel;
    use lim_models::PoissonCounting;

    fn interval(m: &PoissonCounting, n: f64, cl: f64) -> LikelihoodInterval {
        let d = m.observed(n).unwrap();
        let p = Profiler::new(m, ProfilerConfig::default()).unwrap();
        let start = m.config().snapshot_point().unwrap();
        ProfileLikelihoodCalculator::new(cl).unwrap().interval(&p, &d, &start).unwrap()
    }

    #[test]
    fn counting_reference_intervals() {
        let m = PoissonCounting::new();
        let i90 = interval(&m, 25.0, 0.90);
        assert_relative_eq!(i90.mu_hat, 0.5, epsilon = 1e-4);
        assert_relative_eq!(i90.lower, -0.234825, epsilon = 2e-5);
        assert_relative_eq!(i90.upper, 1.414978, epsilon = 2e-5);
        assert_eq!(i90.lower_status, LimitStatus::Found);
        assert_eq!(i90.upper_status, LimitStatus::Found);

        let i68 = interval(&m, 25.0, 0.6827);
        assert_relative_eq!(i68.lower, 0.032763, epsilon = 2e-5);
        assert_relative_eq!(i68.upper, 1.033874, epsilon = 2e-5);
        assert!(i68.lower > i90.lower && i68.upper < i90.upper);
    }

    #[test]
    fn edge_outside_range_reports_boundary() {
        let m = PoissonCounting::with_yields(10.0, 20.0, (0.0, 1.0)).unwrap();
        let i = interval(&m, 25.0, 0.90);
        assert_eq!(i.upper, 1.0);
        assert_eq!(i.upper_status, LimitStatus::AtBoundary);
        assert_eq!(i.lower, 0.0);
        assert_eq!(i.lower_status, LimitStatus::AtBoundary);
    }

    #[test]
    fn best_fit_on_boundary() {
        let m = PoissonCounting::new();
        let i = interval(&m, 5.0, 0.90);
        assert_relative_eq!(i.mu_hat, -1.0, epsilon = 1e-8);
        assert_eq!(i.lower_status, LimitStatus::AtBoundary);
        assert_eq!(i.upper_status, LimitStatus::Found);
        assert!(i.upper > -1.0);
    }

    #[test]
    fn scan_matches_statistic() {
        let m = PoissonCounting::new();
        let d = m.observed(25.0).unwrap();
        let p = Profiler::new(&m, ProfilerConfig::default()).unwrap();
        let start = m.config().snapshot_point().unwrap();
        let mus = [0.0, 0.5, 1.0, 2.0];
        let s = scan(&p, &d, &start, &mus, Sidedness::TwoSided).unwrap();
        assert_eq!(s.points.len(), 4);
        for pt in &s.points {
            let lam = 10.0 * pt.mu + 20.0;
            let expected = 2.0 * (lam - 25.0 - 25.0 * (lam / 25.0).ln());
            assert_relative_eq!(pt.t, expected, epsilon = 1e-5);
            assert!(pt.converged);
        }
        let one = scan(&p, &d, &start, &mus, Sidedness::OneSided).unwrap();
        assert_eq!(one.points[0].t, 0.0);
    }

    #[test]
    fn invalid_level_rejected() {
        assert!(ProfileLikelihoodCalculator::new(0.0).is_err());
        assert!(ProfileLikelihoodCalculator::new(1.2).is_err());
    }
}
