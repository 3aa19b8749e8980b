//! Toy ensembles and empirical sampling distributions.
//!
//! Randomness is deterministic via per-toy seeding (`seed + toy_idx`),
//! independent of the thread count. Each toy starts from its generating
//! hypothesis point, with global observables resampled for that toy.

use crate::test_statistic::{DataSource, ProfileLikelihoodRatio};
use lim_core::{Error, ParameterPoint, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Offset separating the global-observable stream from the data stream of a toy.
const GLOBAL_OBS_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Cooperative cancellation flag, checked before each toy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Toy-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToyConfig {
    /// Toys under the null (signal+background) hypothesis.
    pub n_toys_null: usize,
    /// Toys under the alternative (background-only) hypothesis.
    pub n_toys_alt: usize,
    /// Base seed.
    pub seed: u64,
    /// Events per toy; `None` draws a Poisson count for extended models and
    /// generates one event for non-extended models.
    pub events_per_toy: Option<usize>,
    /// Minimum number of toys per rayon task.
    pub min_parallel_chunk: usize,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            n_toys_null: 1000,
            n_toys_alt: 1000,
            seed: 0,
            events_per_toy: None,
            min_parallel_chunk: 16,
        }
    }
}

/// Empirical distribution of the test statistic under one hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingDistribution {
    /// Tested POI value.
    pub mu_test: f64,
    /// Generating hypothesis name.
    pub hypothesis: String,
    values: Vec<f64>,
    /// Toys requested.
    pub n_requested: usize,
    /// Toys whose generation or fits errored.
    pub n_failed: usize,
    /// Valid toys with a non-converged fit.
    pub n_nonconverged: usize,
    /// Toys skipped after cancellation.
    pub n_cancelled: usize,
}

impl SamplingDistribution {
    /// Distribution from raw statistic values (sorted internally).
    pub fn from_values(mu_test: f64, hypothesis: impl Into<String>, mut values: Vec<f64>) -> Self {
        values.retain(|v| v.is_finite());
        values.sort_by(f64::total_cmp);
        let n = values.len();
        Self {
            mu_test,
            hypothesis: hypothesis.into(),
            values,
            n_requested: n,
            n_failed: 0,
            n_nonconverged: 0,
            n_cancelled: 0,
        }
    }

    /// Sorted statistic values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of valid toys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` without valid toys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fraction of toys with `t >= threshold` (ties count as extreme).
    pub fn p_value(&self, threshold: f64) -> Result<f64> {
        if self.values.is_empty() {
            return Err(Error::Computation(format!(
                "empty sampling distribution for '{}' at mu={}",
                self.hypothesis, self.mu_test
            )));
        }
        let idx = self.values.partition_point(|v| *v < threshold);
        Ok((self.values.len() - idx) as f64 / self.values.len() as f64)
    }

    /// Value at cumulative probability `p` (linear interpolation between order statistics).
    ///
    /// Fails with [`Error::InsufficientToys`] when `n * min(p, 1 - p) < 1`.
    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Validation(format!("quantile must be in [0, 1], got {p}")));
        }
        let n = self.values.len();
        if (n as f64) * p.min(1.0 - p) < 1.0 {
            return Err(Error::InsufficientToys { quantile: p, available: n });
        }
        let idx = p * ((n - 1) as f64);
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        if lo == hi {
            return Ok(self.values[lo]);
        }
        let w = idx - lo as f64;
        Ok(self.values[lo] + w * (self.values[hi] - self.values[lo]))
    }
}

enum ToyOutcome {
    Valid { t: f64, converged: bool },
    Failed,
    Cancelled,
}

/// Throws toy ensembles for one test statistic.
pub struct ToySampler<'s, 'a> {
    statistic: &'s ProfileLikelihoodRatio<'a>,
    config: ToyConfig,
    cancel: CancelToken,
}

impl<'s, 'a> ToySampler<'s, 'a> {
    /// Sampler over `statistic`.
    pub fn new(statistic: &'s ProfileLikelihoodRatio<'a>, config: ToyConfig, cancel: CancelToken) -> Self {
        Self { statistic, config, cancel }
    }

    /// Generate `n_toys` pseudo-datasets at `point` and evaluate the statistic at `mu_test`.
    ///
    /// Toy `i` uses seed `seed + i`. Failed toys are counted, not fatal; a
    /// cancelled ensemble returns [`Error::Cancelled`].
    pub fn sample(
        &self,
        point: &ParameterPoint,
        hypothesis: &str,
        mu_test: f64,
        n_toys: usize,
        seed: u64,
    ) -> Result<SamplingDistribution> {
        if n_toys == 0 {
            return Err(Error::Validation("n_toys must be > 0".to_string()));
        }
        let model = self.statistic.profiler().model();
        let n_events = match self.config.events_per_toy {
            Some(n) => Some(n),
            None if model.is_extended() => None,
            None => Some(1),
        };

        let outcomes: Vec<ToyOutcome> = (0..n_toys)
            .into_par_iter()
            .with_min_len(self.config.min_parallel_chunk.max(1))
            .map(|toy_idx| {
                if self.cancel.is_cancelled() {
                    return ToyOutcome::Cancelled;
                }
                let toy_seed = seed.wrapping_add(toy_idx as u64);
                let run = || -> Result<(f64, bool)> {
                    let data = model.generate(point.values(), n_events, toy_seed)?;
                    let globals = model
                        .sample_global_observables(point.values(), toy_seed ^ GLOBAL_OBS_STREAM)?;
                    let start = point.with_values(globals)?;
                    let t = self.statistic.evaluate(&data, &start, mu_test, DataSource::Toy(toy_idx))?;
                    Ok((t.value, t.converged))
                };
                match run() {
                    Ok((t, converged)) if t.is_finite() => ToyOutcome::Valid { t, converged },
                    Ok(_) => ToyOutcome::Failed,
                    Err(e) => {
                        log::debug!("toy {toy_idx} ({hypothesis}, mu={mu_test}) failed: {e}");
                        ToyOutcome::Failed
                    }
                }
            })
            .collect();

        let mut values = Vec::with_capacity(n_toys);
        let (mut n_failed, mut n_nonconverged, mut n_cancelled) = (0, 0, 0);
        for o in outcomes {
            match o {
                ToyOutcome::Valid { t, converged } => {
                    values.push(t);
                    n_nonconverged += usize::from(!converged);
                }
                ToyOutcome::Failed => n_failed += 1,
                ToyOutcome::Cancelled => n_cancelled += 1,
            }
        }
        if n_cancelled > 0 {
            return Err(Error::Cancelled);
        }
        if n_failed > 0 {
            log::warn!("{n_failed}/{n_toys} toys failed ({hypothesis}, mu={mu_test})");
        }

        let mut dist = SamplingDistribution::from_values(mu_test, hypothesis, values);
        dist.n_requested = n_toys;
        dist.n_failed = n_failed;
        dist.n_nonconverged = n_nonconverged;
        dist.n_cancelled = n_cancelled;
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::{Profiler, ProfilerConfig};
    use crate::test_statistic::Sidedness;
    use approx::assert_relative_eq;
    use lim_core::StatModel;
    use lim_models::PoissonCounting;

    #[test]
    fn p_value_counts_ties_as_extreme() {
        let d = SamplingDistribution::from_values(1.0, "sb", vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_relative_eq!(d.p_value(1.0).unwrap(), 0.6);
        assert_relative_eq!(d.p_value(0.0).unwrap(), 1.0);
        assert_relative_eq!(d.p_value(3.5).unwrap(), 0.0);
    }

    #[test]
    fn quantile_needs_enough_toys() {
        let d = SamplingDistribution::from_values(1.0, "b", (0..10).map(f64::from).collect());
        assert_relative_eq!(d.quantile(0.5).unwrap(), 4.5);
        assert!(matches!(d.quantile(0.02), Err(Error::InsufficientToys { available: 10, .. })));
    }

    #[test]
    fn empty_distribution_has_no_p_value() {
        let d = SamplingDistribution::from_values(1.0, "b", vec![f64::NAN]);
        assert!(d.is_empty());
        assert!(d.p_value(0.0).is_err());
    }

    #[test]
    fn ensembles_are_reproducible_and_non_negative() {
        let m = PoissonCounting::new();
        let ts = ProfileLikelihoodRatio::new(
            Profiler::new(&m, ProfilerConfig::default()).unwrap(),
            Sidedness::OneSided,
        );
        let sampler = ToySampler::new(&ts, ToyConfig::default(), CancelToken::new());
        let point = m.config().snapshot_point().unwrap().with_value("mu", 0.0).unwrap();
        let a = sampler.sample(&point, "b", 1.0, 64, 42).unwrap();
        let b = sampler.sample(&point, "b", 1.0, 64, 42).unwrap();
        assert_eq!(a.len(), 64);
        assert!(a.values().iter().all(|&t| t >= 0.0));
        let bits = |d: &SamplingDistribution| d.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn cancelled_ensemble_reports_cancellation() {
        let m = PoissonCounting::new();
        let ts = ProfileLikelihoodRatio::new(
            Profiler::new(&m, ProfilerConfig::default()).unwrap(),
            Sidedness::OneSided,
        );
        let cancel = CancelToken::new();
        cancel.cancel();
        let sampler = ToySampler::new(&ts, ToyConfig::default(), cancel);
        let point = m.config().snapshot_point().unwrap();
        assert!(matches!(sampler.sample(&point, "sb", 1.0, 8, 1), Err(Error::Cancelled)));
    }
}
