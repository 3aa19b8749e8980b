//! Bounded minimization.
//!
//! [`Minimizer`] is the seam between the profiler and the numerical optimizer;
//! [`LbfgsbOptimizer`] implements it with argmin's L-BFGS and a More-Thuente
//! line search, enforcing box constraints by clamping plus a projected gradient.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use lim_core::{Error, FitStatus, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the L-BFGS-B optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the projected gradient norm
    pub tol: f64,
    /// Number of corrections to approximate the inverse Hessian
    pub m: usize,
    /// Wall-time budget per minimization
    pub max_time: Option<Duration>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10, max_time: None }
    }
}

/// Result of one minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters (clamped to bounds)
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`
    pub fval: f64,
    /// Iterations used
    pub n_iter: u64,
    /// Objective evaluations
    pub n_fev: usize,
    /// Gradient evaluations
    pub n_gev: usize,
    /// Termination status
    pub status: FitStatus,
}

impl OptimizationResult {
    /// `true` if the minimizer converged.
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, status={:?})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.status
        )
    }
}

/// Objective function for minimization.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate at `params`.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params` (central differences unless overridden).
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];
        let mut work = params.to_vec();
        for i in 0..n {
            let eps = 1e-7 * params[i].abs().max(1.0);
            work[i] = params[i] + eps;
            let f_plus = self.eval(&work)?;
            work[i] = params[i] - eps;
            let f_minus = self.eval(&work)?;
            work[i] = params[i];
            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }
        Ok(grad)
    }
}

/// Bounded minimizer.
pub trait Minimizer: Send + Sync {
    /// Minimize `objective` from `init` within `bounds`.
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult>;
}

struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counts: Arc<FuncCounts>,
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

impl<'a> CostFunction for ArgminProblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl<'a> Gradient for ArgminProblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // Zero components that point out of the box at an active bound.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
            if x <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if x >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
        }

        Ok(g)
    }
}

/// L-BFGS-B optimizer with box constraints
#[derive(Debug, Clone, Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create an optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

impl Minimizer for LbfgsbOptimizer {
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let init_clamped = clamp_params(init_params, bounds);

        if init_clamped.is_empty() {
            let fval = objective.eval(&init_clamped)?;
            return Ok(OptimizationResult {
                parameters: init_clamped,
                fval,
                n_iter: 0,
                n_fev: 1,
                n_gev: 0,
                status: FitStatus::Converged,
            });
        }

        let counts = Arc::new(FuncCounts::default());
        let problem = ArgminProblem { objective, bounds, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // Argmin's default cost tolerance (~EPS) is too strict for NLL scales.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration (tol): {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| {
                Error::Validation(format!("Invalid optimizer configuration (tol_cost): {e}"))
            })?;

        let mut executor = Executor::new(problem, solver)
            .configure(|state| state.param(init_clamped).max_iters(self.config.max_iter));
        if let Some(t) = self.config.max_time {
            executor = executor.timeout(t);
        }
        let res =
            executor.run().map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let state = res.state();
        let best_unclamped = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?
            .clone();
        let parameters = clamp_params(&best_unclamped, bounds);
        let fval = state.get_best_cost();
        let n_iter = state.get_iter();

        let status = match state.get_termination_status() {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached) => {
                FitStatus::Converged
            }
            TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
                FitStatus::MaxIterations
            }
            TerminationStatus::Terminated(TerminationReason::Timeout) => FitStatus::Timeout,
            other => FitStatus::Failed(other.to_string()),
        };

        Ok(OptimizationResult {
            parameters,
            fval,
            n_iter,
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            status,
        })
    }
}
