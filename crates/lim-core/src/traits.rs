//! Core traits for limitscan

use crate::types::{Dataset, ModelConfig, ParameterPoint};
use crate::{Error, Result};

/// A parametric statistical model the inference engine can profile and sample.
///
/// Parameter vectors are always in [`ModelConfig::parameters`] order. The model
/// carries no "current values": every evaluation receives the full point.
pub trait StatModel: Send + Sync {
    /// Parameter partition and hypothesis snapshot.
    fn config(&self) -> &ModelConfig;

    /// Negative log-likelihood `-ln L(params | data)`.
    ///
    /// Global observables are read from `params`.
    fn nll(&self, params: &[f64], data: &Dataset) -> Result<f64>;

    /// Expected data at `params` (the Asimov dataset).
    fn expected_data(&self, params: &[f64]) -> Result<Dataset>;

    /// `true` if the model predicts the total event count.
    fn is_extended(&self) -> bool;

    /// Draw pseudo-data at `params`.
    ///
    /// Extended models draw the event count from a Poisson unless `n_events`
    /// is given; non-extended models require it.
    fn generate(&self, params: &[f64], n_events: Option<usize>, seed: u64) -> Result<Dataset>;

    /// Global-observable values for the Asimov dataset at `params`.
    ///
    /// Returns a full parameter vector; the default leaves them untouched.
    fn asimov_global_observables(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(params.to_vec())
    }

    /// Resample the global observables around `params` for one toy.
    ///
    /// Returns a full parameter vector; the default leaves them untouched.
    fn sample_global_observables(&self, params: &[f64], seed: u64) -> Result<Vec<f64>> {
        let _ = seed;
        Ok(params.to_vec())
    }

    /// Number of parameters.
    fn dim(&self) -> usize {
        self.config().parameters.len()
    }

    /// [`StatModel::nll`] at an explicit parameter point.
    fn nll_at(&self, point: &ParameterPoint, data: &Dataset) -> Result<f64> {
        self.config().check_point(point)?;
        self.nll(point.values(), data)
    }

    /// Check that `data` carries exactly the configured observables.
    fn check_dataset(&self, data: &Dataset) -> Result<()> {
        let cfg = self.config();
        if data.observables().len() != cfg.observables.len()
            || data.observables().iter().zip(&cfg.observables).any(|(a, b)| *a != b.name)
        {
            return Err(Error::Validation(format!(
                "dataset columns {:?} do not match observables of '{}'",
                data.observables(),
                cfg.name
            )));
        }
        Ok(())
    }
}
