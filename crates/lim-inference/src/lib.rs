//! # lim-inference
//!
//! Likelihood profiling and hypothesis-test inversion for limitscan.
//!
//! This crate provides:
//! - Bounded minimization and nuisance-parameter profiling
//! - The profile-likelihood-ratio test statistic
//! - Asymptotic and toy-based sampling distributions behind one engine trait
//! - CLs hypothesis tests and their inversion into limits with expected bands
//! - Profile-likelihood and Bayesian intervals
//!
//! ## Layering
//!
//! `HypoTestInverter` → `HypoTestCalculator` → `ProfileLikelihoodRatio` +
//! `SamplingDistributionEngine` → `Profiler` → `Minimizer`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Asymptotic (Asimov) sampling distributions.
pub mod asymptotic;
/// Bayesian credible intervals.
pub mod bayesian;
/// Hypothesis tests: hypotheses, engine trait, calculators.
pub mod calculator;
/// Analysis options.
pub mod config;
/// Scan inversion into limits.
pub mod inverter;
/// Bounded numerical minimization (L-BFGS-B backend).
pub mod optimizer;
/// Profile likelihood scans and intervals.
pub mod profile_likelihood;
/// Nuisance-parameter profiling.
pub mod profiler;
/// Profile-likelihood-ratio test statistic.
pub mod test_statistic;
/// Toy-based sampling distributions.
pub mod toybased;
/// Toy ensembles.
pub mod toys;

pub use asymptotic::{AsymptoticCalculator, AsymptoticEngine, AsymptoticForm};
pub use bayesian::{BayesianCalculator, BayesianConfig, BayesianInterval, Prior, TailPolicy};
pub use calculator::{
    Calculator, Cls, HypoTestCalculator, HypoTestResult, Hypothesis, SamplingDistributionEngine,
    TestSetup, EXPECTED_BANDS,
};
pub use config::{AnalysisConfig, BayesTail, EngineKind, ToyCounts};
pub use inverter::{Crossing, HypoTestInverter, InverterConfig, ScanGrid, ScanPoint, ScanResult};
pub use optimizer::{LbfgsbOptimizer, Minimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use profile_likelihood::{
    LikelihoodInterval, LimitStatus, ProfileLikelihoodCalculator, ProfileLikelihoodScan, ProfilePoint,
};
pub use profiler::{PoiConstraint, Profiler, ProfilerConfig};
pub use test_statistic::{DataSource, ProfileLikelihoodRatio, Sidedness, TestStatisticValue};
pub use toybased::{FrequentistCalculator, ToyEngine};
pub use toys::{CancelToken, SamplingDistribution, ToyConfig, ToySampler};
