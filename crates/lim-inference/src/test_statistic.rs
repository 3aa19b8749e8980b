//! Profile-likelihood-ratio test statistic.
//!
//! `t(mu) = 2 * (nll(mu, theta_hat_hat) - nll(mu_hat, theta_hat))`, clamped at 0.
//! The one-sided variant sets `t = 0` whenever `mu_hat > mu` (an upward
//! fluctuation is never evidence against `mu`). The unconditional `mu_hat` is
//! confined to the POI range by the bounded fit, so a best fit outside the
//! range is evaluated on the boundary and flagged by `at_boundary`.

use crate::profiler::{PoiConstraint, Profiler};
use lim_core::{Dataset, ParameterPoint, ProfileResult, Result};
use serde::{Deserialize, Serialize};

/// Sidedness of the test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sidedness {
    /// Upper-limit style: `t = 0` when `mu_hat > mu`.
    OneSided,
    /// Interval style: `t` unmodified.
    TwoSided,
}

/// Where a statistic value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// The observed dataset.
    Observed,
    /// The Asimov dataset of the alternative hypothesis.
    Asimov,
    /// Toy number `n` of an ensemble.
    Toy(usize),
}

/// One evaluation of the test statistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStatisticValue {
    /// Statistic value (>= 0).
    pub value: f64,
    /// Tested POI value.
    pub mu_test: f64,
    /// Unconditional best-fit POI.
    pub mu_hat: f64,
    /// Conditional minimum (`NaN` when the conditional fit was skipped).
    pub nll_conditional: f64,
    /// Unconditional minimum.
    pub nll_unconditional: f64,
    /// Data provenance.
    pub source: DataSource,
    /// Both fits converged.
    pub converged: bool,
    /// Either fit ended on a parameter boundary.
    pub at_boundary: bool,
}

/// The profile-likelihood-ratio statistic for one model.
pub struct ProfileLikelihoodRatio<'a> {
    profiler: Profiler<'a>,
    sidedness: Sidedness,
}

impl<'a> ProfileLikelihoodRatio<'a> {
    /// Statistic over `profiler` with the given sidedness.
    pub fn new(profiler: Profiler<'a>, sidedness: Sidedness) -> Self {
        Self { profiler, sidedness }
    }

    /// The underlying profiler.
    pub fn profiler(&self) -> &Profiler<'a> {
        &self.profiler
    }

    /// Sidedness of the statistic.
    pub fn sidedness(&self) -> Sidedness {
        self.sidedness
    }

    /// Unconditional fit from `start`.
    pub fn free_fit(&self, data: &Dataset, start: &ParameterPoint) -> Result<ProfileResult> {
        self.profiler.profile(data, start, PoiConstraint::Free)
    }

    /// Evaluate at `mu_test`, running both fits from `start`.
    ///
    /// One-sided evaluations with `mu_hat > mu_test` skip the conditional fit.
    pub fn evaluate(
        &self,
        data: &Dataset,
        start: &ParameterPoint,
        mu_test: f64,
        source: DataSource,
    ) -> Result<TestStatisticValue> {
        let free = self.free_fit(data, start)?;
        if self.sidedness == Sidedness::OneSided && free.poi_value > mu_test {
            return Ok(TestStatisticValue {
                value: 0.0,
                mu_test,
                mu_hat: free.poi_value,
                nll_conditional: f64::NAN,
                nll_unconditional: free.nll,
                source,
                converged: free.converged(),
                at_boundary: free.at_boundary,
            });
        }
        let (value, _) = self.evaluate_with_free(data, &free, mu_test, source)?;
        Ok(value)
    }

    /// Evaluate at `mu_test` reusing a cached unconditional fit.
    ///
    /// The conditional fit starts from the free fit's point with the POI moved
    /// to `mu_test`, and is returned alongside the statistic.
    pub fn evaluate_with_free(
        &self,
        data: &Dataset,
        free: &ProfileResult,
        mu_test: f64,
        source: DataSource,
    ) -> Result<(TestStatisticValue, ProfileResult)> {
        let cond = self.profiler.profile(data, &free.point, PoiConstraint::Fixed(mu_test))?;
        let value = ratio(self.sidedness, cond.nll, free.nll, free.poi_value, mu_test);
        Ok((
            TestStatisticValue {
                value,
                mu_test,
                mu_hat: free.poi_value,
                nll_conditional: cond.nll,
                nll_unconditional: free.nll,
                source,
                converged: free.converged() && cond.converged(),
                at_boundary: free.at_boundary || cond.at_boundary,
            },
            cond,
        ))
    }
}

/// Statistic from the two minima.
pub fn ratio(sidedness: Sidedness, nll_cond: f64, nll_free: f64, mu_hat: f64, mu_test: f64) -> f64 {
    if sidedness == Sidedness::OneSided && mu_hat > mu_test {
        return 0.0;
    }
    (2.0 * (nll_cond - nll_free)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ProfilerConfig;
    use approx::assert_relative_eq;
    use lim_core::StatModel;
    use lim_models::PoissonCounting;
    use proptest::prelude::*;

    fn counting_t(n: f64, mu: f64, sidedness: Sidedness) -> f64 {
        // Closed form for Poisson(n | 10 mu + 20) with mu_hat = (n - 20) / 10.
        let lam = 10.0 * mu + 20.0;
        let mu_hat = (n - 20.0) / 10.0;
        if sidedness == Sidedness::OneSided && mu_hat > mu {
            return 0.0;
        }
        2.0 * (lam - n - n * (lam / n).ln())
    }

    #[test]
    fn matches_closed_form_counting() {
        let m = PoissonCounting::new();
        let d = m.observed(25.0).unwrap();
        let start = m.config().snapshot_point().unwrap();
        for side in [Sidedness::OneSided, Sidedness::TwoSided] {
            let ts = ProfileLikelihoodRatio::new(
                Profiler::new(&m, ProfilerConfig::default()).unwrap(),
                side,
            );
            for mu in [0.0, 0.3, 1.0, 2.0] {
                let t = ts.evaluate(&d, &start, mu, DataSource::Observed).unwrap();
                assert_relative_eq!(t.value, counting_t(25.0, mu, side), epsilon = 1e-5);
                assert!(t.converged);
            }
        }
    }

    #[test]
    fn one_sided_clamp_applies_above_mu_hat() {
        assert_eq!(ratio(Sidedness::OneSided, 12.0, 10.0, 1.5, 1.0), 0.0);
        assert_eq!(ratio(Sidedness::TwoSided, 12.0, 10.0, 1.5, 1.0), 4.0);
        assert_eq!(ratio(Sidedness::TwoSided, 9.999_999, 10.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn cached_free_fit_gives_same_value() {
        let m = PoissonCounting::new();
        let d = m.observed(25.0).unwrap();
        let start = m.config().snapshot_point().unwrap();
        let ts = ProfileLikelihoodRatio::new(
            Profiler::new(&m, ProfilerConfig::default()).unwrap(),
            Sidedness::OneSided,
        );
        let free = ts.free_fit(&d, &start).unwrap();
        let (a, cond) = ts.evaluate_with_free(&d, &free, 1.5, DataSource::Observed).unwrap();
        let b = ts.evaluate(&d, &start, 1.5, DataSource::Observed).unwrap();
        assert_relative_eq!(a.value, b.value, epsilon = 1e-9);
        assert_eq!(cond.poi_value, 1.5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn one_sided_value_is_non_negative(
            n in 0u32..80,
            signal in 0.5f64..30.0,
            background in 0.5f64..50.0,
            mu_test in 0.0f64..5.0,
        ) {
            let m = PoissonCounting::with_yields(signal, background, (0.0, 10.0)).unwrap();
            let d = m.observed(n as f64).unwrap();
            let start = m.config().snapshot_point().unwrap();
            let ts = ProfileLikelihoodRatio::new(
                Profiler::new(&m, ProfilerConfig::default()).unwrap(),
                Sidedness::OneSided,
            );
            let t = ts.evaluate(&d, &start, mu_test, DataSource::Observed).unwrap();
            prop_assert!(t.value >= 0.0, "t={} at n={n} mu={mu_test}", t.value);
            if t.mu_hat > mu_test {
                prop_assert_eq!(t.value, 0.0);
            }
        }
    }
}
