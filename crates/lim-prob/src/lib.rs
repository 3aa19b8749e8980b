//! Probability building blocks for limitscan.
//!
//! This crate hosts the probability math shared by the reference models and
//! the inference engine:
//! - base distributions (logpdf/cdf/quantile)
//! - small numeric helpers (stable log-sum-exp)

pub mod chi2;
pub mod exponential;
pub mod math;
pub mod normal;
pub mod poisson;
