//! Chi-square distribution utilities.

use lim_core::{Error, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Quantile of a chi-square distribution with `dof` degrees of freedom.
///
/// One degree of freedom goes through the normal quantile, `Φ^{-1}((1+p)/2)^2`.
pub fn quantile(p: f64, dof: f64) -> Result<f64> {
    if !(0.0..1.0).contains(&p) {
        return Err(Error::Validation(format!("probability must be in [0, 1), got {p}")));
    }
    if dof == 1.0 {
        let z = crate::normal::quantile(0.5 * (1.0 + p))?;
        return Ok(z * z);
    }
    let d = ChiSquared::new(dof).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(d.inverse_cdf(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_dof_quantiles() {
        assert_relative_eq!(quantile(0.6826894921370859, 1.0).unwrap(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(quantile(0.90, 1.0).unwrap(), 2.705_543_454_095_404, epsilon = 1e-8);
        assert_relative_eq!(quantile(0.95, 1.0).unwrap(), 3.841_458_820_694_124, epsilon = 1e-8);
    }

    #[test]
    fn test_one_dof_matches_general_path() {
        let d = ChiSquared::new(1.0).unwrap();
        for p in [0.5, 0.9, 0.99] {
            assert_relative_eq!(quantile(p, 1.0).unwrap(), d.inverse_cdf(p), epsilon = 1e-6);
        }
        assert_relative_eq!(quantile(0.95, 2.0).unwrap(), -2.0 * 0.05f64.ln(), epsilon = 1e-8);
    }

    #[test]
    fn test_invalid() {
        assert!(quantile(1.0, 1.0).is_err());
        assert!(quantile(0.5, 0.0).is_err());
    }
}
