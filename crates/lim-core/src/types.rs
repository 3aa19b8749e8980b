//! Common data types for limitscan

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Declaration of a model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name (unique within a model).
    pub name: String,
    /// Declared start value.
    pub init: f64,
    /// Allowed range `(lower, upper)`.
    pub bounds: (f64, f64),
    /// Constant parameters are never floated by a fit.
    #[serde(default)]
    pub constant: bool,
}

impl ParameterSpec {
    /// Floating parameter with a start value and range.
    pub fn new(name: impl Into<String>, init: f64, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), init, bounds, constant: false }
    }

    /// Constant parameter pinned at `value`.
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), init: value, bounds: (value, value), constant: true }
    }
}

/// Declaration of an observable (a dataset column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableSpec {
    /// Column name.
    pub name: String,
    /// Allowed range `(lower, upper)`.
    pub bounds: (f64, f64),
}

impl ObservableSpec {
    /// Observable with its range.
    pub fn new(name: impl Into<String>, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), bounds }
    }
}

/// An explicit, immutable assignment of values to every model parameter.
///
/// Names are shared between clones; updates return a new point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    names: Arc<[String]>,
    values: Vec<f64>,
    constant: Vec<bool>,
}

impl ParameterPoint {
    /// Build a point from parallel name/value/constancy vectors.
    pub fn new(names: Vec<String>, values: Vec<f64>, constant: Vec<bool>) -> Result<Self> {
        if names.len() != values.len() || names.len() != constant.len() {
            return Err(Error::Validation(format!(
                "ParameterPoint length mismatch: names={} values={} constant={}",
                names.len(),
                values.len(),
                constant.len()
            )));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for n in &names {
            if !seen.insert(n.as_str()) {
                return Err(Error::Validation(format!("duplicate parameter name '{n}'")));
            }
        }
        Ok(Self { names: names.into(), values, constant })
    }

    /// Parameter names, in model order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Parameter values, in model order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Constancy flags, in model order.
    pub fn constant_flags(&self) -> &[bool] {
        &self.constant
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if the point has no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    /// `true` if `name` is present and constant.
    pub fn is_constant(&self, name: &str) -> bool {
        self.index_of(name).map(|i| self.constant[i]).unwrap_or(false)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::Validation(format!("unknown parameter '{name}'")))
    }

    /// Copy of this point with `name` set to `value`.
    pub fn with_value(&self, name: &str, value: f64) -> Result<Self> {
        let i = self.require(name)?;
        let mut out = self.clone();
        out.values[i] = value;
        Ok(out)
    }

    /// Copy of this point with `name` set to `value` and marked constant.
    pub fn with_fixed(&self, name: &str, value: f64) -> Result<Self> {
        let i = self.require(name)?;
        let mut out = self.clone();
        out.values[i] = value;
        out.constant[i] = true;
        Ok(out)
    }

    /// Copy of this point with `name` marked floating.
    pub fn with_released(&self, name: &str) -> Result<Self> {
        let i = self.require(name)?;
        let mut out = self.clone();
        out.constant[i] = false;
        Ok(out)
    }

    /// Copy of this point with all values replaced (names and constancy kept).
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.values.len() {
            return Err(Error::Validation(format!(
                "value length mismatch: expected {}, got {}",
                self.values.len(),
                values.len()
            )));
        }
        Ok(Self { names: Arc::clone(&self.names), values, constant: self.constant.clone() })
    }

    /// Iterate over `(name, value, constant)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, bool)> + '_ {
        self.names
            .iter()
            .zip(self.values.iter())
            .zip(self.constant.iter())
            .map(|((n, &v), &c)| (n.as_str(), v, c))
    }
}

/// Partition of a model's parameters plus a named hypothesis snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Configuration name (e.g. `"ModelConfig"`, `"B_only_model"`).
    pub name: String,
    /// All parameters, in model order.
    pub parameters: Vec<ParameterSpec>,
    /// Parameters of interest (this engine scans the first one).
    pub poi: Vec<String>,
    /// Nuisance parameters.
    pub nuisance: Vec<String>,
    /// Dataset columns.
    pub observables: Vec<ObservableSpec>,
    /// Auxiliary measurements carried by the parameter point, not by the dataset.
    #[serde(default)]
    pub global_observables: Vec<String>,
    /// Snapshot of the hypothesis this configuration stands for.
    #[serde(default)]
    pub snapshot: Option<Vec<(String, f64)>>,
}

impl ModelConfig {
    /// Check the partition invariants.
    pub fn validate(&self) -> Result<()> {
        if self.poi.is_empty() {
            return Err(Error::Validation("ModelConfig has no POI".to_string()));
        }
        let mut params = HashSet::new();
        for p in &self.parameters {
            if !params.insert(p.name.as_str()) {
                return Err(Error::Validation(format!("duplicate parameter '{}'", p.name)));
            }
            let (lo, hi) = p.bounds;
            if !(lo <= hi) || !lo.is_finite() || !hi.is_finite() {
                return Err(Error::Validation(format!(
                    "parameter '{}' has invalid bounds ({lo}, {hi})",
                    p.name
                )));
            }
            if !(lo..=hi).contains(&p.init) {
                return Err(Error::Validation(format!(
                    "parameter '{}' init {} outside bounds ({lo}, {hi})",
                    p.name, p.init
                )));
            }
        }

        let mut claimed: HashSet<&str> = HashSet::new();
        let sets: [(&str, Vec<&str>); 3] = [
            ("poi", self.poi.iter().map(String::as_str).collect()),
            ("nuisance", self.nuisance.iter().map(String::as_str).collect()),
            ("global observable", self.global_observables.iter().map(String::as_str).collect()),
        ];
        for (kind, names) in &sets {
            for n in names {
                if !params.contains(n) {
                    return Err(Error::Validation(format!("{kind} '{n}' is not a model parameter")));
                }
                if !claimed.insert(n) {
                    return Err(Error::Validation(format!(
                        "'{n}' appears in more than one parameter set"
                    )));
                }
            }
        }

        for o in &self.observables {
            if params.contains(o.name.as_str()) {
                return Err(Error::Validation(format!(
                    "observable '{}' is also a parameter",
                    o.name
                )));
            }
        }

        if let Some(snap) = &self.snapshot {
            for (n, _) in snap {
                if !params.contains(n.as_str()) {
                    return Err(Error::Validation(format!(
                        "snapshot names unknown parameter '{n}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Name of the (first) parameter of interest.
    pub fn poi_name(&self) -> Result<&str> {
        self.poi
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::Validation("No POI defined".to_string()))
    }

    /// Index of the POI in model order.
    pub fn poi_index(&self) -> Result<usize> {
        let name = self.poi_name()?;
        self.parameter_index(name)
            .ok_or_else(|| Error::Validation(format!("POI '{name}' is not a model parameter")))
    }

    /// Declared range of the POI.
    pub fn poi_bounds(&self) -> Result<(f64, f64)> {
        Ok(self.parameters[self.poi_index()?].bounds)
    }

    /// Index of `name` in model order.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Parameter bounds, in model order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| p.bounds).collect()
    }

    /// Index of every global observable.
    pub fn global_observable_indices(&self) -> Vec<usize> {
        self.global_observables.iter().filter_map(|n| self.parameter_index(n)).collect()
    }

    /// Point at the declared start values; constant parameters and global
    /// observables are marked constant.
    pub fn default_point(&self) -> ParameterPoint {
        let names: Vec<String> = self.parameters.iter().map(|p| p.name.clone()).collect();
        let values: Vec<f64> = self.parameters.iter().map(|p| p.init).collect();
        let constant: Vec<bool> = self
            .parameters
            .iter()
            .map(|p| p.constant || self.global_observables.contains(&p.name))
            .collect();
        ParameterPoint { names: names.into(), values, constant }
    }

    /// The snapshot hypothesis (declared start values overridden by the snapshot).
    pub fn snapshot_point(&self) -> Result<ParameterPoint> {
        let mut point = self.default_point();
        if let Some(snap) = &self.snapshot {
            for (n, v) in snap {
                point = point.with_value(n, *v)?;
            }
        }
        Ok(point)
    }

    /// Copy with a new name and snapshot (e.g. a background-only clone).
    pub fn with_snapshot(&self, name: impl Into<String>, snapshot: Vec<(String, f64)>) -> Self {
        let mut out = self.clone();
        out.name = name.into();
        out.snapshot = Some(snapshot);
        out
    }

    /// Check that `point` lines up with this configuration.
    pub fn check_point(&self, point: &ParameterPoint) -> Result<()> {
        if point.len() != self.parameters.len()
            || point.names().iter().zip(&self.parameters).any(|(a, b)| *a != b.name)
        {
            return Err(Error::Validation(format!(
                "parameter point does not match ModelConfig '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Observed values of the explicit observables.
///
/// Rows are entries (events or bins); `weights` is set for binned or Asimov
/// data where each row stands for a weighted count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observables: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(default)]
    weights: Option<Vec<f64>>,
}

impl Dataset {
    /// Unweighted dataset.
    pub fn new(observables: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::build(observables, rows, None)
    }

    /// Weighted dataset (one non-negative weight per row).
    pub fn weighted(observables: Vec<String>, rows: Vec<Vec<f64>>, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != rows.len() {
            return Err(Error::Validation(format!(
                "weights length {} != rows {}",
                weights.len(),
                rows.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Validation("weights must be finite and >= 0".to_string()));
        }
        Self::build(observables, rows, Some(weights))
    }

    fn build(observables: Vec<String>, rows: Vec<Vec<f64>>, weights: Option<Vec<f64>>) -> Result<Self> {
        let width = observables.len();
        for (i, r) in rows.iter().enumerate() {
            if r.len() != width {
                return Err(Error::Validation(format!(
                    "row {i} has {} values, expected {width}",
                    r.len()
                )));
            }
            if r.iter().any(|v| !v.is_finite()) {
                return Err(Error::Validation(format!("row {i} has non-finite values")));
            }
        }
        Ok(Self { observables, rows, weights })
    }

    /// Column names.
    pub fn observables(&self) -> &[String] {
        &self.observables
    }

    /// Rows (entries).
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Per-row weights, if weighted.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Weight of row `i` (1 for unweighted data).
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map(|w| w[i]).unwrap_or(1.0)
    }

    /// Number of rows.
    pub fn n_entries(&self) -> usize {
        self.rows.len()
    }

    /// Sum of weights (number of rows when unweighted).
    pub fn sum_weights(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.rows.len() as f64,
        }
    }

    /// Index of column `name`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.observables
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::Validation(format!("dataset has no observable '{name}'")))
    }

    /// Value of column `col` in the single row of a one-entry dataset.
    pub fn single_value(&self, col: usize) -> Result<f64> {
        match self.rows.as_slice() {
            [row] => Ok(row[col]),
            _ => Err(Error::Validation(format!(
                "expected a single-entry dataset, got {} entries",
                self.rows.len()
            ))),
        }
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum FitStatus {
    /// Converged within tolerance.
    Converged,
    /// Iteration budget exhausted.
    MaxIterations,
    /// Wall-time budget exhausted.
    Timeout,
    /// Minimizer reported an error.
    Failed(String),
}

impl FitStatus {
    /// `true` for [`FitStatus::Converged`].
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

/// Result of profiling the likelihood at a (fixed or free) POI value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResult {
    /// POI value at the minimum (the fixed value for conditional fits).
    pub poi_value: f64,
    /// Full parameter point at the minimum.
    pub point: ParameterPoint,
    /// Minimized negative log-likelihood.
    pub nll: f64,
    /// Convergence status.
    pub status: FitStatus,
    /// Some floating parameter ended on its range boundary.
    pub at_boundary: bool,
    /// Minimizer iterations (summed over retries).
    pub n_iter: u64,
    /// Objective evaluations (summed over retries).
    pub n_fev: usize,
}

impl ProfileResult {
    /// `true` if the minimization converged.
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}
