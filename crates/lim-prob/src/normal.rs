//! Normal distribution utilities.

use lim_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Natural log of `sqrt(2π)`.
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Log-PDF of a Normal distribution `N(mu, sigma)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    let z = (x - mu) / sigma;
    Ok(-0.5 * z * z - sigma.ln() - LN_SQRT_2PI)
}

/// Negative log-likelihood for a Normal distribution `N(mu, sigma)` at `x`.
pub fn nll(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    Ok(-logpdf(x, mu, sigma)?)
}

/// Standard normal CDF `Φ(x)`.
///
/// Uses `erfc` so the lower tail keeps full relative precision.
pub fn cdf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile `Φ^{-1}(p)`.
pub fn quantile(p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!("probability must be in [0, 1], got {p}")));
    }
    let n = Normal::new(0.0, 1.0).map_err(|e| Error::Computation(e.to_string()))?;
    Ok(n.inverse_cdf(p))
}

/// Log-PDF of `N(mu, sigma)` truncated to `[lo, hi]`.
pub fn truncated_logpdf(x: f64, mu: f64, sigma: f64, lo: f64, hi: f64) -> Result<f64> {
    if !(lo < hi) {
        return Err(Error::Validation(format!("invalid truncation range ({lo}, {hi})")));
    }
    if x < lo || x > hi {
        return Ok(f64::NEG_INFINITY);
    }
    let mass = cdf((hi - mu) / sigma) - cdf((lo - mu) / sigma);
    if mass <= 0.0 {
        return Err(Error::Computation(format!(
            "N({mu}, {sigma}) has no mass on ({lo}, {hi})"
        )));
    }
    Ok(logpdf(x, mu, sigma)? - mass.ln())
}
