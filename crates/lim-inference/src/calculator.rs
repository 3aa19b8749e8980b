//! Hypothesis-test calculators.
//!
//! A calculator tests one POI value at a time: it evaluates the observed
//! statistic against a null (signal+background at `mu`) and an alternative
//! (background-only) hypothesis, and asks its [`SamplingDistributionEngine`]
//! for the tail probabilities:
//!
//! - `p_sb = P(t >= t_obs | null)`
//! - `CLb  = P(t >= t_obs | alt)`, `p_b = 1 - CLb`
//! - `CLs  = p_sb / CLb`

use crate::profiler::{PoiConstraint, Profiler, ProfilerConfig};
use crate::test_statistic::{DataSource, ProfileLikelihoodRatio, Sidedness, TestStatisticValue};
use crate::toys::SamplingDistribution;
use lim_core::{Dataset, Error, ModelConfig, ParameterPoint, ProfileResult, Result, StatModel};
use serde::{Deserialize, Serialize};

/// Expected-band positions in units of sigma of the alternative distribution.
///
/// Index 0 is the -2 sigma band (lowest expected limit), index 4 the +2 sigma band.
pub const EXPECTED_BANDS: [f64; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

/// A CLs value, or the explicit marker that CLb was zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "Option<f64>", from = "Option<f64>")]
pub enum Cls {
    /// `p_sb / CLb`, clamped to `[0, 1]`.
    Value(f64),
    /// CLb is zero (or not finite).
    Undefined,
}

impl Cls {
    /// `p_sb / clb`, or [`Cls::Undefined`] when `clb` is not positive.
    pub fn from_ratio(p_sb: f64, clb: f64) -> Self {
        if !(p_sb.is_finite() && clb.is_finite()) || clb <= 0.0 {
            return Cls::Undefined;
        }
        Cls::Value((p_sb / clb).clamp(0.0, 1.0))
    }

    /// The value, if defined.
    pub fn as_option(&self) -> Option<f64> {
        match self {
            Cls::Value(v) => Some(*v),
            Cls::Undefined => None,
        }
    }

    /// The value, or [`Error::UndefinedCls`].
    pub fn value(&self, mu_test: f64) -> Result<f64> {
        self.as_option().ok_or(Error::UndefinedCls { mu_test })
    }
}

impl From<Cls> for Option<f64> {
    fn from(c: Cls) -> Self {
        c.as_option()
    }
}

impl From<Option<f64>> for Cls {
    fn from(v: Option<f64>) -> Self {
        v.map(Cls::Value).unwrap_or(Cls::Undefined)
    }
}

/// A named hypothesis: a full parameter point built from a [`ModelConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Name (the configuration it was built from).
    pub name: String,
    /// Parameter values of the hypothesis.
    pub point: ParameterPoint,
    /// POI value of the hypothesis.
    pub poi_value: f64,
}

impl Hypothesis {
    /// Hypothesis from a configuration's snapshot.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let poi = config.poi_name()?;
        let point = config.snapshot_point()?;
        let poi_value = point
            .get(poi)
            .ok_or_else(|| Error::Validation(format!("snapshot lacks POI '{poi}'")))?;
        Ok(Self { name: config.name.clone(), point, poi_value })
    }

    /// Background-only clone of `config` with the POI at `poi_value`.
    pub fn background_only(config: &ModelConfig, poi_value: f64) -> Result<Self> {
        let poi = config.poi_name()?.to_string();
        let b_only = config.with_snapshot("B_only_model", vec![(poi, poi_value)]);
        Self::from_config(&b_only)
    }
}

/// Everything a calculator needs besides its engine: model, observed data,
/// both hypotheses, the test statistic, and the cached unconditional fit.
pub struct TestSetup<'a> {
    model: &'a dyn StatModel,
    data: &'a Dataset,
    null: Hypothesis,
    alt: Hypothesis,
    statistic: ProfileLikelihoodRatio<'a>,
    observed_free: ProfileResult,
}

impl<'a> TestSetup<'a> {
    /// Validate inputs and run the unconditional fit on the observed data.
    pub fn new(
        model: &'a dyn StatModel,
        data: &'a Dataset,
        null: Hypothesis,
        alt: Hypothesis,
        sidedness: Sidedness,
        profiler: ProfilerConfig,
    ) -> Result<Self> {
        let cfg = model.config();
        model.check_dataset(data)?;
        cfg.check_point(&null.point)?;
        cfg.check_point(&alt.point)?;
        if !alt.poi_value.is_finite() {
            return Err(Error::Validation("alternative POI value must be finite".to_string()));
        }
        let poi = cfg.poi_name()?;
        if null.point.is_constant(poi) || alt.point.is_constant(poi) {
            return Err(Error::Validation(format!(
                "POI '{poi}' must not be constant in the test hypotheses"
            )));
        }

        let profiler = Profiler::new(model, profiler)?;
        let observed_free = profiler.profile_or_fail(
            data,
            &null.point,
            PoiConstraint::Free,
            "unconditional fit on observed data",
        )?;
        if observed_free.at_boundary {
            log::debug!("observed best fit is on a boundary (mu_hat={})", observed_free.poi_value);
        }
        let statistic = ProfileLikelihoodRatio::new(profiler, sidedness);
        Ok(Self { model, data, null, alt, statistic, observed_free })
    }

    /// The model under test.
    pub fn model(&self) -> &'a dyn StatModel {
        self.model
    }

    /// The observed dataset.
    pub fn data(&self) -> &'a Dataset {
        self.data
    }

    /// Null (signal+background) hypothesis template.
    pub fn null(&self) -> &Hypothesis {
        &self.null
    }

    /// Alternative (background-only) hypothesis.
    pub fn alt(&self) -> &Hypothesis {
        &self.alt
    }

    /// The test statistic.
    pub fn statistic(&self) -> &ProfileLikelihoodRatio<'a> {
        &self.statistic
    }

    /// Cached unconditional fit on the observed data.
    pub fn observed_free(&self) -> &ProfileResult {
        &self.observed_free
    }

    /// Declared POI range.
    pub fn poi_bounds(&self) -> (f64, f64) {
        self.statistic.profiler().poi_bounds()
    }

    /// Observed statistic at `mu_test` plus the conditional fit it used.
    pub fn observed(&self, mu_test: f64) -> Result<(TestStatisticValue, ProfileResult)> {
        self.statistic.evaluate_with_free(
            self.data,
            &self.observed_free,
            mu_test,
            DataSource::Observed,
        )
    }
}

/// What an engine reports for one tested POI value.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// `P(t >= t_obs | null)`.
    pub p_sb: f64,
    /// `P(t >= t_obs | alt)`.
    pub clb: f64,
    /// Expected CLs at each of [`EXPECTED_BANDS`].
    pub expected_cls: [Cls; 5],
    /// An engine-side fit (Asimov or toy generation) did not converge.
    pub degraded: bool,
    /// Non-fatal problems (non-converged fits, unresolved bands).
    pub warnings: Vec<String>,
    /// Null-hypothesis toy distribution, for toy engines.
    pub null_distribution: Option<SamplingDistribution>,
    /// Alternative-hypothesis toy distribution, for toy engines.
    pub alt_distribution: Option<SamplingDistribution>,
}

/// Source of the statistic's sampling distributions.
pub trait SamplingDistributionEngine: Send + Sync {
    /// Short name for reports.
    fn name(&self) -> &'static str;

    /// Tail probabilities of `observed` under both hypotheses, plus expected bands.
    ///
    /// `conditional` is the observed-data fit at `observed.mu_test`.
    fn evaluate(
        &self,
        setup: &TestSetup<'_>,
        observed: &TestStatisticValue,
        conditional: &ProfileResult,
    ) -> Result<EngineOutput>;
}

/// Result of testing one POI value.
#[derive(Debug, Clone, Serialize)]
pub struct HypoTestResult {
    /// Tested POI value.
    pub mu_test: f64,
    /// Observed statistic.
    pub t_obs: f64,
    /// Unconditional best-fit POI on observed data.
    pub mu_hat: f64,
    /// `P(t >= t_obs | null)`.
    pub p_sb: f64,
    /// `1 - CLb`.
    pub p_b: f64,
    /// `P(t >= t_obs | alt)`.
    pub clb: f64,
    /// `p_sb / CLb`.
    pub cls: Cls,
    /// Expected CLs at each of [`EXPECTED_BANDS`].
    pub expected_cls: [Cls; 5],
    /// Observed and engine-side fits converged.
    pub converged: bool,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Null toy distribution, when toys were thrown.
    #[serde(skip)]
    pub null_distribution: Option<SamplingDistribution>,
    /// Alternative toy distribution, when toys were thrown.
    #[serde(skip)]
    pub alt_distribution: Option<SamplingDistribution>,
}

impl HypoTestResult {
    /// `true` if the point should not be trusted for interpolation.
    ///
    /// Warnings alone (for example an unresolved expected band) do not degrade a point.
    pub fn is_degraded(&self) -> bool {
        !self.converged
    }
}

/// Tests single POI values.
pub trait HypoTestCalculator: Sync {
    /// Test `mu_test`.
    fn hypotest(&self, mu_test: f64) -> Result<HypoTestResult>;

    /// Declared POI range.
    fn poi_bounds(&self) -> (f64, f64);
}

/// A [`TestSetup`] paired with a sampling-distribution engine.
pub struct Calculator<'a, E> {
    setup: TestSetup<'a>,
    engine: E,
}

impl<'a, E: SamplingDistributionEngine> Calculator<'a, E> {
    /// Pair a setup with an engine prepared for it.
    pub fn from_parts(setup: TestSetup<'a>, engine: E) -> Self {
        Self { setup, engine }
    }

    /// The shared setup.
    pub fn setup(&self) -> &TestSetup<'a> {
        &self.setup
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: SamplingDistributionEngine> HypoTestCalculator for Calculator<'_, E> {
    fn hypotest(&self, mu_test: f64) -> Result<HypoTestResult> {
        if !mu_test.is_finite() {
            return Err(Error::Validation(format!("mu_test must be finite, got {mu_test}")));
        }
        let (observed, conditional) = self.setup.observed(mu_test)?;
        let out = self.engine.evaluate(&self.setup, &observed, &conditional)?;

        let mut warnings = out.warnings;
        if !observed.converged {
            warnings.insert(0, format!("observed fits did not converge at mu={mu_test}"));
        }
        let cls = Cls::from_ratio(out.p_sb, out.clb);
        if cls == Cls::Undefined {
            log::warn!("{}: CLb is zero at mu={mu_test}; CLs undefined", self.engine.name());
        }
        log::debug!(
            "{}: mu={mu_test} t_obs={:.6} p_sb={:.6e} clb={:.6e} cls={:?}",
            self.engine.name(),
            observed.value,
            out.p_sb,
            out.clb,
            cls
        );

        Ok(HypoTestResult {
            mu_test,
            t_obs: observed.value,
            mu_hat: observed.mu_hat,
            p_sb: out.p_sb,
            p_b: 1.0 - out.clb,
            clb: out.clb,
            cls,
            expected_cls: out.expected_cls,
            converged: observed.converged && !out.degraded,
            warnings,
            null_distribution: out.null_distribution,
            alt_distribution: out.alt_distribution,
        })
    }

    fn poi_bounds(&self) -> (f64, f64) {
        self.setup.poi_bounds()
    }
}
