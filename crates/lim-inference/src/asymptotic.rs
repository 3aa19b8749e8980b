//! Asymptotic (Wilks/Wald) sampling distributions.
//!
//! The Asimov dataset is built once per setup: nuisance parameters are fitted
//! to the observed data with the POI fixed at the background-only value, the
//! model's expected data at that point replaces the observations, and global
//! observables are set to their Asimov values. `q_A(mu)` is the statistic of
//! that dataset at `mu`, with the unconditional Asimov fit cached.
//!
//! With `z = sqrt(q)` and `z_A = sqrt(q_A)`:
//!
//! - one-sided: `p_sb = Φ(-z)`, `CLb = Φ(z_A - z)`
//! - `qtilde` (one-sided with POI lower bound 0), when `z > z_A`:
//!   `s = (q - q_A) / (2 z_A)`, `p_sb = Φ(-(s + z_A))`, `CLb = Φ(-s)`
//! - two-sided: `p_sb = 2 Φ(-z)`, `CLb = Φ(z_A - z) + Φ(-z_A - z)`

use crate::calculator::{
    Calculator, Cls, EngineOutput, SamplingDistributionEngine, TestSetup, EXPECTED_BANDS,
};
use crate::profiler::PoiConstraint;
use crate::test_statistic::{DataSource, Sidedness, TestStatisticValue};
use lim_core::{Dataset, ProfileResult, Result};
use lim_prob::normal;
use serde::{Deserialize, Serialize};

/// Which asymptotic formula set applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsymptoticForm {
    /// One-sided `q_mu`.
    OneSided,
    /// One-sided `qtilde_mu` for a POI bounded below at zero.
    QTilde,
    /// Two-sided `t_mu`.
    TwoSided,
}

impl AsymptoticForm {
    /// Form implied by the statistic's sidedness and the POI lower bound.
    pub fn select(sidedness: Sidedness, poi_lower: f64) -> Self {
        match sidedness {
            Sidedness::TwoSided => AsymptoticForm::TwoSided,
            Sidedness::OneSided if poi_lower == 0.0 => AsymptoticForm::QTilde,
            Sidedness::OneSided => AsymptoticForm::OneSided,
        }
    }
}

/// `(p_sb, CLb)` for observed `q` and Asimov `q_a`.
pub fn pvalues(form: AsymptoticForm, q: f64, q_a: f64) -> (f64, f64) {
    let q = q.max(0.0);
    let q_a = q_a.max(0.0);
    let sqrtq = q.sqrt();
    let sqrtq_a = q_a.sqrt();
    let (p_sb, clb) = match form {
        AsymptoticForm::QTilde if sqrtq > sqrtq_a => {
            let teststat = (q - q_a) / (2.0 * sqrtq_a.max(1e-16));
            (normal::cdf(-(teststat + sqrtq_a)), normal::cdf(-teststat))
        }
        AsymptoticForm::OneSided | AsymptoticForm::QTilde => {
            (normal::cdf(-sqrtq), normal::cdf(sqrtq_a - sqrtq))
        }
        AsymptoticForm::TwoSided => (
            2.0 * normal::cdf(-sqrtq),
            normal::cdf(sqrtq_a - sqrtq) + normal::cdf(-sqrtq_a - sqrtq),
        ),
    };
    (p_sb.clamp(0.0, 1.0), clb.clamp(0.0, 1.0))
}

/// Expected CLs at each of [`EXPECTED_BANDS`] for Asimov `q_a`.
pub fn expected_cls_band(form: AsymptoticForm, q_a: f64) -> [Cls; 5] {
    let sqrtq_a = q_a.max(0.0).sqrt();
    let mut out = [Cls::Undefined; 5];
    for (i, k) in EXPECTED_BANDS.into_iter().enumerate() {
        out[i] = match form {
            AsymptoticForm::OneSided | AsymptoticForm::QTilde => {
                Cls::from_ratio(normal::cdf(k - sqrtq_a), normal::cdf(k))
            }
            AsymptoticForm::TwoSided => {
                let z = (sqrtq_a - k).abs();
                let (p_sb, clb) = pvalues(form, z * z, q_a);
                Cls::from_ratio(p_sb, clb)
            }
        };
    }
    out
}

/// Engine evaluating tail probabilities from the asymptotic formulae.
pub struct AsymptoticEngine {
    form: AsymptoticForm,
    asimov_data: Dataset,
    asimov_free: ProfileResult,
}

impl AsymptoticEngine {
    /// Build the Asimov dataset and its unconditional fit.
    pub fn prepare(setup: &TestSetup<'_>) -> Result<Self> {
        let model = setup.model();
        let statistic = setup.statistic();
        let profiler = statistic.profiler();
        let alt = setup.alt();

        let nuisance_fit = profiler.profile_or_fail(
            setup.data(),
            &alt.point,
            PoiConstraint::Fixed(alt.poi_value),
            "Asimov nuisance fit",
        )?;
        let asimov_data = model.expected_data(nuisance_fit.point.values())?;
        let globals = model.asimov_global_observables(nuisance_fit.point.values())?;
        let asimov_start = nuisance_fit.point.with_values(globals)?;
        let asimov_free = profiler.profile_or_fail(
            &asimov_data,
            &asimov_start,
            PoiConstraint::Free,
            "unconditional fit on Asimov data",
        )?;

        let form = AsymptoticForm::select(statistic.sidedness(), setup.poi_bounds().0);
        log::debug!(
            "asymptotic: form={form:?} asimov mu_hat={} nll={}",
            asimov_free.poi_value,
            asimov_free.nll
        );
        Ok(Self { form, asimov_data, asimov_free })
    }

    /// Formula set in use.
    pub fn form(&self) -> AsymptoticForm {
        self.form
    }

    /// The Asimov dataset.
    pub fn asimov_data(&self) -> &Dataset {
        &self.asimov_data
    }

    /// Cached unconditional fit on the Asimov dataset.
    pub fn asimov_free(&self) -> &ProfileResult {
        &self.asimov_free
    }

    /// Asimov statistic `q_A(mu_test)`.
    pub fn asimov_statistic(&self, setup: &TestSetup<'_>, mu_test: f64) -> Result<TestStatisticValue> {
        let (value, _) = setup.statistic().evaluate_with_free(
            &self.asimov_data,
            &self.asimov_free,
            mu_test,
            DataSource::Asimov,
        )?;
        Ok(value)
    }
}

impl SamplingDistributionEngine for AsymptoticEngine {
    fn name(&self) -> &'static str {
        "asymptotic"
    }

    fn evaluate(
        &self,
        setup: &TestSetup<'_>,
        observed: &TestStatisticValue,
        _conditional: &ProfileResult,
    ) -> Result<EngineOutput> {
        let asimov = self.asimov_statistic(setup, observed.mu_test)?;
        let mut warnings = Vec::new();
        if !asimov.converged {
            warnings.push(format!("Asimov fits did not converge at mu={}", observed.mu_test));
        }
        let (p_sb, clb) = pvalues(self.form, observed.value, asimov.value);
        Ok(EngineOutput {
            p_sb,
            clb,
            expected_cls: expected_cls_band(self.form, asimov.value),
            degraded: !asimov.converged,
            warnings,
            null_distribution: None,
            alt_distribution: None,
        })
    }
}

/// Hypothesis-test calculator with asymptotic distributions.
pub type AsymptoticCalculator<'a> = Calculator<'a, AsymptoticEngine>;

impl<'a> Calculator<'a, AsymptoticEngine> {
    /// Asymptotic calculator over `setup`.
    pub fn new(setup: TestSetup<'a>) -> Result<Self> {
        let engine = AsymptoticEngine::prepare(&setup)?;
        Ok(Self::from_parts(setup, engine))
    }
}
