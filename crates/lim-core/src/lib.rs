//! # lim-core
//!
//! Core types, traits, and error handling for limitscan.
//!
//! This crate provides:
//! - The shared error type and the failure taxonomy of the inference engine
//! - Parameter points, model configurations, and datasets
//! - The [`StatModel`] trait implemented by every likelihood provider

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::StatModel;
pub use types::{
    Dataset, FitStatus, ModelConfig, ObservableSpec, ParameterPoint, ParameterSpec, ProfileResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
