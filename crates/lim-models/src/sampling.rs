//! Random draws shared by the reference models.
//!
//! Every draw is deterministic given its seed (`StdRng::seed_from_u64`).

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};

/// Expected counts below this floor are treated as the floor in likelihoods.
pub const LAMBDA_FLOOR: f64 = 1e-12;

/// Seeded generator for one toy.
pub fn rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// One Poisson draw; non-positive or non-finite means give 0.
pub fn poisson_draw(lambda: f64, rng: &mut StdRng) -> f64 {
    if !lambda.is_finite() || lambda <= 0.0 {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(p) => p.sample(rng),
        Err(_) => 0.0,
    }
}

/// One Gaussian draw `N(mean, sigma)`; a degenerate width returns `mean`.
pub fn normal_draw(mean: f64, sigma: f64, rng: &mut StdRng) -> f64 {
    match Normal::new(mean, sigma) {
        Ok(n) if sigma > 0.0 => n.sample(rng),
        _ => mean,
    }
}

/// Poisson negative log-likelihood with the mean floored at [`LAMBDA_FLOOR`].
pub fn poisson_nll(n: f64, lambda: f64) -> lim_core::Result<f64> {
    lim_prob::poisson::nll(n, lambda.max(LAMBDA_FLOOR))
}
