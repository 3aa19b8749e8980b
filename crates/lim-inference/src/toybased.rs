//! Toy-based (frequentist) sampling distributions.
//!
//! Null toys are generated at the conditional fit of the observed data at the
//! tested POI value; alternative toys at the conditional fit at the
//! background-only POI value. Both ensembles evaluate the statistic at the
//! tested value. The null ensemble uses seed `seed + 1_000_000_000` so the
//! two streams never overlap.
//!
//! Expected CLs at band `k` evaluates the observed-style ratio at the
//! alternative distribution's quantile `Φ(-k)` (large `t` means strong
//! exclusion, so the +2 sigma band sits at the low tail of `t`).

use crate::calculator::{
    Calculator, Cls, EngineOutput, SamplingDistributionEngine, TestSetup, EXPECTED_BANDS,
};
use crate::profiler::PoiConstraint;
use crate::test_statistic::TestStatisticValue;
use crate::toys::{CancelToken, SamplingDistribution, ToyConfig, ToySampler};
use lim_core::{Error, ProfileResult, Result};

const NULL_SEED_OFFSET: u64 = 1_000_000_000;

/// Engine that throws toys at every tested POI value.
pub struct ToyEngine {
    config: ToyConfig,
    cancel: CancelToken,
    alt_generation: ProfileResult,
}

impl ToyEngine {
    /// Fit the background-only generation point and keep the toy settings.
    pub fn prepare(setup: &TestSetup<'_>, config: ToyConfig, cancel: CancelToken) -> Result<Self> {
        if config.n_toys_null == 0 || config.n_toys_alt == 0 {
            return Err(Error::Validation("toy counts must be > 0".to_string()));
        }
        let alt = setup.alt();
        let alt_generation = setup.statistic().profiler().profile_or_fail(
            setup.data(),
            &alt.point,
            PoiConstraint::Fixed(alt.poi_value),
            "background-only generation fit",
        )?;
        Ok(Self { config, cancel, alt_generation })
    }

    /// Toy settings.
    pub fn config(&self) -> &ToyConfig {
        &self.config
    }

    /// Cancellation handle shared with callers.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

fn expected_from_toys(
    null: &SamplingDistribution,
    alt: &SamplingDistribution,
    warnings: &mut Vec<String>,
) -> Result<[Cls; 5]> {
    let mut out = [Cls::Undefined; 5];
    for (i, k) in EXPECTED_BANDS.into_iter().enumerate() {
        let rank = lim_prob::normal::cdf(-k);
        match alt.quantile(rank) {
            Ok(t_k) => out[i] = Cls::from_ratio(null.p_value(t_k)?, alt.p_value(t_k)?),
            Err(e @ Error::InsufficientToys { .. }) => {
                warnings.push(format!("expected band {k:+}: {e}"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

impl SamplingDistributionEngine for ToyEngine {
    fn name(&self) -> &'static str {
        "toys"
    }

    fn evaluate(
        &self,
        setup: &TestSetup<'_>,
        observed: &TestStatisticValue,
        conditional: &ProfileResult,
    ) -> Result<EngineOutput> {
        let mu = observed.mu_test;
        let sampler = ToySampler::new(setup.statistic(), self.config.clone(), self.cancel.clone());

        let null = sampler.sample(
            &conditional.point,
            &setup.null().name,
            mu,
            self.config.n_toys_null,
            self.config.seed.wrapping_add(NULL_SEED_OFFSET),
        )?;
        let alt = sampler.sample(
            &self.alt_generation.point,
            &setup.alt().name,
            mu,
            self.config.n_toys_alt,
            self.config.seed,
        )?;
        if null.is_empty() || alt.is_empty() {
            return Err(Error::Computation(format!(
                "all toys failed at mu={mu}: null_valid={} alt_valid={}",
                null.len(),
                alt.len()
            )));
        }

        let mut warnings = Vec::new();
        if !conditional.converged() {
            warnings.push(format!("null generation fit did not converge at mu={mu}"));
        }
        for d in [&null, &alt] {
            if d.n_failed > 0 {
                warnings.push(format!("{}: {} of {} toys failed", d.hypothesis, d.n_failed, d.n_requested));
            }
        }

        let p_sb = null.p_value(observed.value)?;
        let clb = alt.p_value(observed.value)?;
        let expected_cls = expected_from_toys(&null, &alt, &mut warnings)?;

        Ok(EngineOutput {
            p_sb,
            clb,
            expected_cls,
            degraded: !conditional.converged(),
            warnings,
            null_distribution: Some(null),
            alt_distribution: Some(alt),
        })
    }
}

/// Hypothesis-test calculator with toy-based distributions.
pub type FrequentistCalculator<'a> = Calculator<'a, ToyEngine>;

impl<'a> Calculator<'a, ToyEngine> {
    /// Toy-based calculator over `setup`.
    pub fn new(setup: TestSetup<'a>, config: ToyConfig) -> Result<Self> {
        Self::with_cancel(setup, config, CancelToken::new())
    }

    /// Toy-based calculator with an external cancellation token.
    pub fn with_cancel(setup: TestSetup<'a>, config: ToyConfig, cancel: CancelToken) -> Result<Self> {
        let engine = ToyEngine::prepare(&setup, config, cancel)?;
        Ok(Self::from_parts(setup, engine))
    }
}
