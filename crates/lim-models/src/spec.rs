//! Serializable description of a reference model plus its observed data.
//!
//! ```yaml
//! kind: on_off
//! observed_sr: 25
//! observed_cr: 200
//! cr_global: true
//! ```

use crate::{GaussConstrainedCounting, MassPeakModel, OnOffCounting, PoissonCounting};
use lim_core::{Dataset, Error, Result, StatModel};
use serde::{Deserialize, Serialize};

fn default_signal() -> f64 {
    10.0
}

fn default_background() -> f64 {
    20.0
}

fn default_mu_bounds() -> (f64, f64) {
    (-1.0, 10.0)
}

fn default_cr() -> f64 {
    200.0
}

fn default_seed() -> u64 {
    12345
}

/// A reference model and its observed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// `Poisson(n | mu * s + b)`.
    PoissonCounting {
        /// Observed count.
        observed: f64,
        /// Signal yield at `mu = 1`.
        #[serde(default = "default_signal")]
        signal: f64,
        /// Background yield.
        #[serde(default = "default_background")]
        background: f64,
        /// POI range.
        #[serde(default = "default_mu_bounds")]
        mu_bounds: (f64, f64),
    },
    /// Signal region plus background control region.
    OnOff {
        /// Observed signal-region count.
        observed_sr: f64,
        /// Observed control-region count.
        #[serde(default = "default_cr")]
        observed_cr: f64,
        /// Treat the control-region count as a global observable.
        #[serde(default)]
        cr_global: bool,
    },
    /// Gaussian-constrained background uncertainty.
    GaussConstrained {
        /// Observed signal-region count.
        observed: f64,
    },
    /// Extended unbinned mass peak.
    MassPeak {
        /// Observed masses; generated at `mu = 1` from `seed` when absent.
        #[serde(default)]
        masses: Option<Vec<f64>>,
        /// Seed for the generated observed dataset.
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

/// A model ready for inference together with its observed dataset.
pub struct BuiltModel {
    /// The likelihood model.
    pub model: Box<dyn StatModel>,
    /// The observed dataset.
    pub data: Dataset,
}

impl std::fmt::Debug for BuiltModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltModel")
            .field("config", &self.model.config().name)
            .field("entries", &self.data.n_entries())
            .finish()
    }
}

impl ModelSpec {
    /// Parse a JSON model description.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Build the model and its observed data.
    pub fn build(&self) -> Result<BuiltModel> {
        let built = match self {
            ModelSpec::PoissonCounting { observed, signal, background, mu_bounds } => {
                let m = PoissonCounting::with_yields(*signal, *background, *mu_bounds)?;
                let data = m.observed(*observed)?;
                BuiltModel { model: Box::new(m), data }
            }
            ModelSpec::OnOff { observed_sr, observed_cr, cr_global } => {
                let m = OnOffCounting::new(*cr_global, *observed_cr);
                let data = m.observed(*observed_sr, *observed_cr)?;
                BuiltModel { model: Box::new(m), data }
            }
            ModelSpec::GaussConstrained { observed } => {
                let m = GaussConstrainedCounting::new();
                let data = m.observed(*observed)?;
                BuiltModel { model: Box::new(m), data }
            }
            ModelSpec::MassPeak { masses, seed } => {
                let m = MassPeakModel::new();
                let data = match masses {
                    Some(v) => {
                        Dataset::new(vec!["mgg".to_string()], v.iter().map(|&x| vec![x]).collect())?
                    }
                    None => {
                        let nominal = m.config().snapshot_point()?;
                        m.generate(nominal.values(), None, *seed)?
                    }
                };
                BuiltModel { model: Box::new(m), data }
            }
        };
        built.model.config().validate()?;
        built.model.check_dataset(&built.data)?;
        if built.data.n_entries() == 0 && !built.model.is_extended() {
            return Err(Error::Validation("observed dataset is empty".to_string()));
        }
        log::debug!(
            "built model '{}' with {} observed entries",
            built.model.config().name,
            built.data.n_entries()
        );
        Ok(built)
    }
}
