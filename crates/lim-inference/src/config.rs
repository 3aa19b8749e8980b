//! User-facing analysis options.
//!
//! One serde struct collects every recognized option; the engines take their
//! own config structs, derived from it here.

use crate::bayesian::{BayesianConfig, TailPolicy};
use crate::inverter::{InverterConfig, ScanGrid};
use crate::test_statistic::Sidedness;
use crate::toys::ToyConfig;
use lim_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Sampling-distribution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Closed-form asymptotic distributions.
    #[default]
    Asymptotic,
    /// Toy Monte Carlo.
    Toy,
}

/// Credible-interval tail policy as accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BayesTail {
    /// Equal tails.
    #[default]
    Central,
    /// Upper limit.
    Upper,
    /// Highest-density interval.
    Shortest,
}

impl From<BayesTail> for TailPolicy {
    fn from(t: BayesTail) -> Self {
        match t {
            BayesTail::Central => TailPolicy::Central,
            BayesTail::Upper => TailPolicy::Upper,
            BayesTail::Shortest => TailPolicy::Shortest,
        }
    }
}

/// Toy counts per hypothesis and the base seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToyCounts {
    /// Toys under the null hypothesis.
    pub null: usize,
    /// Toys under the alternative hypothesis.
    pub alt: usize,
    /// Base seed.
    pub seed: u64,
}

impl Default for ToyCounts {
    fn default() -> Self {
        Self { null: 1000, alt: 1000, seed: 0 }
    }
}

/// All analysis options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Confidence (or credibility) level in (0, 1).
    pub confidence_level: f64,
    /// Test-statistic sidedness.
    pub sidedness: Sidedness,
    /// POI values to test.
    pub grid: ScanGrid,
    /// Toy settings, used by the toy engine.
    pub toys: ToyCounts,
    /// Sampling-distribution backend.
    pub engine: EngineKind,
    /// Credible-interval tail policy.
    pub bayes_tail: BayesTail,
    /// POI value of the background-only hypothesis.
    pub alt_poi: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            sidedness: Sidedness::OneSided,
            grid: ScanGrid::default(),
            toys: ToyCounts::default(),
            engine: EngineKind::Asymptotic,
            bayes_tail: BayesTail::Central,
            alt_poi: 0.0,
        }
    }
}

impl AnalysisConfig {
    /// Reject out-of-range options.
    pub fn validate(&self) -> Result<()> {
        let cl = self.confidence_level;
        if !(0.0 < cl && cl < 1.0) {
            return Err(Error::Validation(format!("confidence_level must be in (0, 1), got {cl}")));
        }
        self.grid.validate()?;
        if self.engine == EngineKind::Toy && (self.toys.null == 0 || self.toys.alt == 0) {
            return Err(Error::Validation("toy counts must be > 0".to_string()));
        }
        if !self.alt_poi.is_finite() {
            return Err(Error::Validation("alt_poi must be finite".to_string()));
        }
        Ok(())
    }

    /// Inverter settings.
    pub fn inverter(&self) -> InverterConfig {
        InverterConfig { confidence_level: self.confidence_level, grid: self.grid.clone(), parallel: true }
    }

    /// Toy-engine settings.
    pub fn toy_config(&self) -> ToyConfig {
        ToyConfig {
            n_toys_null: self.toys.null,
            n_toys_alt: self.toys.alt,
            seed: self.toys.seed,
            ..ToyConfig::default()
        }
    }

    /// Bayesian settings.
    pub fn bayesian(&self) -> BayesianConfig {
        BayesianConfig {
            confidence_level: self.confidence_level,
            tail: self.bayes_tail.into(),
            ..BayesianConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_grid_and_toys() {
        let cfg: AnalysisConfig = serde_json::from_str(
            r#"{
                "confidence_level": 0.9,
                "grid": {"fixed": {"points": 11, "min": 0.0, "max": 3.0}},
                "toys": {"null": 500, "seed": 7},
                "engine": "toy",
                "bayes_tail": "shortest"
            }"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.grid, ScanGrid::Fixed { points: 11, min: 0.0, max: 3.0 });
        assert_eq!(cfg.toy_config().n_toys_null, 500);
        assert_eq!(cfg.toy_config().n_toys_alt, 1000);
        assert_eq!(cfg.bayesian().tail, TailPolicy::Shortest);
        assert_eq!(cfg.sidedness, Sidedness::OneSided);
    }

    #[test]
    fn unknown_options_rejected() {
        let r: std::result::Result<AnalysisConfig, _> = serde_json::from_str(r#"{"confidance_level": 0.9}"#);
        assert!(r.is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let cfg = AnalysisConfig { confidence_level: 1.5, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = AnalysisConfig {
            grid: ScanGrid::Fixed { points: 5, min: 2.0, max: 1.0 },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = AnalysisConfig {
            engine: EngineKind::Toy,
            toys: ToyCounts { null: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
