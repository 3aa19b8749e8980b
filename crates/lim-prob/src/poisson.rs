//! Poisson distribution utilities.

use lim_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// Log-PMF of a Poisson distribution with mean `lambda` at count `k`.
pub fn logpmf(k: u64, lambda: f64) -> Result<f64> {
    logpmf_continuous(k as f64, lambda)
}

/// Poisson log-PMF continued to non-integer counts via `ln Γ(k + 1)`.
///
/// Asimov datasets carry expected (fractional) counts.
pub fn logpmf_continuous(k: f64, lambda: f64) -> Result<f64> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(Error::Validation(format!("lambda must be finite and >= 0, got {}", lambda)));
    }
    if !k.is_finite() || k < 0.0 {
        return Err(Error::Validation(format!("count must be finite and >= 0, got {}", k)));
    }
    if lambda == 0.0 {
        return Ok(if k == 0.0 { 0.0 } else { f64::NEG_INFINITY });
    }
    Ok(k * lambda.ln() - lambda - ln_gamma(k + 1.0))
}

/// Negative log-likelihood of a Poisson distribution at (possibly fractional) `k`.
pub fn nll(k: f64, lambda: f64) -> Result<f64> {
    Ok(-logpmf_continuous(k, lambda)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factorial(n: u64) -> u64 {
        (1..=n).product()
    }

    #[test]
    fn test_basic_value_matches_naive() {
        let k = 3u64;
        let lambda: f64 = 2.5;
        let prob = lambda.powi(k as i32) * (-lambda).exp() / factorial(k) as f64;
        let lp = logpmf(k, lambda).unwrap();
        assert!((lp - prob.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_lambda_zero() {
        assert_eq!(logpmf(0, 0.0).unwrap(), 0.0);
        assert!(logpmf(1, 0.0).unwrap().is_infinite());
    }

    #[test]
    fn test_continuous_agrees_at_integers() {
        for k in [0u64, 1, 7, 25] {
            let a = logpmf(k, 20.0).unwrap();
            let b = logpmf_continuous(k as f64, 20.0).unwrap();
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(logpmf(1, -1.0).is_err());
        assert!(logpmf_continuous(-0.5, 1.0).is_err());
        assert!(logpmf(1, f64::NAN).is_err());
    }
}
