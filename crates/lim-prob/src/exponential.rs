//! Exponential-shape utilities on a finite range.
//!
//! The shape is `exp(slope * x)` normalized on `[lo, hi]`; the slope may take
//! either sign (a falling background spectrum has `slope < 0`).

use lim_core::{Error, Result};

fn check_range(lo: f64, hi: f64) -> Result<()> {
    if !(lo < hi) || !lo.is_finite() || !hi.is_finite() {
        return Err(Error::Validation(format!("invalid range ({lo}, {hi})")));
    }
    Ok(())
}

/// `ln ∫_lo^hi exp(slope * x) dx`, stable for large `|slope|`.
pub fn log_norm(slope: f64, lo: f64, hi: f64) -> Result<f64> {
    check_range(lo, hi)?;
    if slope.abs() * (hi - lo) < 1e-10 {
        return Ok((hi - lo).ln() + slope * 0.5 * (lo + hi));
    }
    // Factor out the endpoint where the exponent is largest.
    let (anchor, width) = if slope > 0.0 { (hi, -(hi - lo)) } else { (lo, hi - lo) };
    let scaled = -(slope * width).exp_m1() * width.signum() / slope;
    Ok(slope * anchor + scaled.abs().ln())
}

/// Log-PDF of the truncated exponential at `x`.
pub fn logpdf(x: f64, slope: f64, lo: f64, hi: f64) -> Result<f64> {
    let ln_z = log_norm(slope, lo, hi)?;
    if x < lo || x > hi {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(slope * x - ln_z)
}

/// Inverse CDF of the truncated exponential, for `u` in `[0, 1]`.
pub fn inverse_cdf(u: f64, slope: f64, lo: f64, hi: f64) -> Result<f64> {
    check_range(lo, hi)?;
    if !(0.0..=1.0).contains(&u) {
        return Err(Error::Validation(format!("u must be in [0, 1], got {u}")));
    }
    if slope.abs() * (hi - lo) < 1e-10 {
        return Ok(lo + u * (hi - lo));
    }
    // CDF(x) = (exp(s(x-lo)) - 1) / (exp(s(hi-lo)) - 1)
    let total = (slope * (hi - lo)).exp_m1();
    let x = lo + (u * total).ln_1p() / slope;
    Ok(x.clamp(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalization_both_signs() {
        for slope in [-0.05, -0.001, 0.0, 0.02] {
            let (lo, hi) = (40.0, 400.0);
            let n = 40_000;
            let h = (hi - lo) / n as f64;
            let s: f64 = (0..n)
                .map(|i| logpdf(lo + (i as f64 + 0.5) * h, slope, lo, hi).unwrap().exp())
                .sum::<f64>()
                * h;
            assert_relative_eq!(s, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_steep_slope_is_finite() {
        let v = logpdf(40.0, -10.0, 40.0, 400.0).unwrap();
        assert!(v.is_finite());
        assert_relative_eq!(v, 10f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_cdf_endpoints_and_median() {
        let (lo, hi, s) = (40.0, 400.0, -0.02);
        assert_relative_eq!(inverse_cdf(0.0, s, lo, hi).unwrap(), lo, epsilon = 1e-12);
        assert_relative_eq!(inverse_cdf(1.0, s, lo, hi).unwrap(), hi, epsilon = 1e-9);
        let med = inverse_cdf(0.5, s, lo, hi).unwrap();
        let expected = lo + (0.5 * ((s * (hi - lo)).exp() + 1.0)).ln() / s;
        assert_relative_eq!(med, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_support() {
        assert_eq!(logpdf(39.0, -0.1, 40.0, 400.0).unwrap(), f64::NEG_INFINITY);
        assert!(logpdf(1.0, -0.1, 5.0, 4.0).is_err());
    }
}
