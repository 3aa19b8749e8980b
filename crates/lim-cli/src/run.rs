//! `limitscan run`: one file describing the model and every analysis option.
//!
//! ```yaml
//! model:
//!   kind: poisson_counting
//!   observed: 25
//! analysis:
//!   confidence_level: 0.9
//!   grid:
//!     adaptive: { lo: 0.0, hi: 2.0, rtol: 1.0e-5, max_iter: 100 }
//! ```

use crate::analysis;
use anyhow::Result;
use lim_inference::AnalysisConfig;
use lim_models::ModelSpec;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Model and observed data.
    pub model: ModelSpec,
    /// Analysis options; every field has a default.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Threads (0 = auto).
    #[serde(default)]
    pub threads: usize,
    /// Skip the Bayesian interval.
    #[serde(default)]
    pub skip_bayesian: bool,
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: RunConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)?
    };
    cfg.analysis.validate()?;
    Ok(cfg)
}

/// Limits, profile likelihood interval and (optionally) the Bayesian interval.
pub fn execute(cfg: &RunConfig) -> Result<serde_json::Value> {
    analysis::init_threads(cfg.threads);
    let built = analysis::build_model(&cfg.model)?;
    let a = &cfg.analysis;

    tracing::info!(engine = ?a.engine, cl = a.confidence_level, "running CLs scan");
    let scan = analysis::upper_limits(&built, a)?;
    let limits = analysis::limits_json(&scan)?;

    tracing::info!("profile likelihood interval");
    let pl = analysis::likelihood_interval(&built, a.confidence_level)?;

    let bayes = if cfg.skip_bayesian {
        serde_json::Value::Null
    } else {
        tracing::info!(tail = ?a.bayes_tail, "bayesian interval");
        let b = analysis::bayesian_interval(&built, a.bayesian())?;
        serde_json::json!({
            "lower": b.lower,
            "upper": b.upper,
            "confidence_level": b.confidence_level,
        })
    };

    Ok(serde_json::json!({
        "analysis": serde_json::to_value(a)?,
        "cls": limits,
        "likelihood_interval": serde_json::to_value(&pl)?,
        "bayesian_interval": bayes,
    }))
}
