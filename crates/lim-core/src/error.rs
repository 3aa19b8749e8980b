//! Error types for limitscan

use thiserror::Error;

/// limitscan error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A minimization did not converge within its iteration or time budget.
    ///
    /// Carries the best point the minimizer reached.
    #[error("Convergence failure ({context}): best fval={fval}")]
    ConvergenceFailure {
        /// What was being fitted (e.g. `"conditional fit at mu=1.5"`).
        context: String,
        /// Objective value at the best point reached.
        fval: f64,
        /// Best parameter values reached, in model order.
        parameters: Vec<f64>,
    },

    /// CLs is undefined because CLb is zero.
    #[error("CLs undefined at mu={mu_test}: CLb is zero")]
    UndefinedCls {
        /// Tested POI value.
        mu_test: f64,
    },

    /// A CLs (or p-value) curve crossed the target level zero or several times.
    #[error("Non-monotonic scan: {} crossing(s) of the target level", crossings.len())]
    NonMonotonicScan {
        /// Every crossing location found by interpolation.
        crossings: Vec<f64>,
        /// The raw `(mu, value)` curve the crossings were searched on.
        curve: Vec<(f64, f64)>,
    },

    /// The toy ensemble is too small to resolve the requested tail quantile.
    #[error("Insufficient toys: quantile {quantile} needs more than {available} toys")]
    InsufficientToys {
        /// Requested cumulative probability.
        quantile: f64,
        /// Number of valid toys available.
        available: usize,
    },

    /// The computation was cancelled cooperatively.
    #[error("Cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_monotonic_message_counts_crossings() {
        let e = Error::NonMonotonicScan { crossings: vec![0.5, 1.5], curve: vec![] };
        assert_eq!(e.to_string(), "Non-monotonic scan: 2 crossing(s) of the target level");
    }

    #[test]
    fn json_errors_convert() {
        let parsed: std::result::Result<f64, _> = serde_json::from_str("not json");
        let e: Error = parsed.unwrap_err().into();
        assert!(matches!(e, Error::Json(_)));
    }
}
