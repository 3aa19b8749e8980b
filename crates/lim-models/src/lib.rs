//! # lim-models
//!
//! Reference likelihood models implementing [`lim_core::StatModel`]:
//!
//! - [`PoissonCounting`]: single-bin counting experiment with known background
//! - [`OnOffCounting`]: signal region plus a control region constraining the background
//! - [`GaussConstrainedCounting`]: background uncertainty as a Gaussian-constrained nuisance
//! - [`MassPeakModel`]: extended unbinned peak-over-exponential model
//!
//! [`ModelSpec`] describes any of these (plus their observed data) in JSON/YAML.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counting;
pub mod gauss_constrained;
pub mod mass_peak;
pub mod on_off;
pub mod sampling;
pub mod spec;

pub use counting::PoissonCounting;
pub use gauss_constrained::GaussConstrainedCounting;
pub use mass_peak::MassPeakModel;
pub use on_off::OnOffCounting;
pub use spec::{BuiltModel, ModelSpec};
