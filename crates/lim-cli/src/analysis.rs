//! Model loading and the calculations shared by subcommands and `run`.

use anyhow::Result;
use lim_core::StatModel;
use lim_inference::{
    AnalysisConfig, AsymptoticCalculator, BayesianCalculator, BayesianConfig, BayesianInterval,
    EngineKind, FrequentistCalculator, HypoTestCalculator, HypoTestInverter, HypoTestResult,
    Hypothesis, LikelihoodInterval, ProfileLikelihoodCalculator, Profiler, ProfilerConfig,
    ScanResult, TestSetup, EXPECTED_BANDS,
};
use lim_models::{BuiltModel, ModelSpec};
use std::path::Path;

/// Parse a model file: JSON by extension, YAML otherwise.
pub fn read_model_spec(path: &Path) -> Result<ModelSpec> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let spec: ModelSpec = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    Ok(spec)
}

/// Build a model and report its size.
pub fn build_model(spec: &ModelSpec) -> Result<BuiltModel> {
    let built = spec.build()?;
    let cfg = built.model.config();
    tracing::info!(
        model = %cfg.name,
        parameters = cfg.parameters.len(),
        entries = built.data.n_entries(),
        "model built"
    );
    Ok(built)
}

/// Size the global rayon pool (0 = auto).
pub fn init_threads(threads: usize) {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }
}

/// Observed data plus signal+background and background-only hypotheses.
pub fn test_setup<'a>(built: &'a BuiltModel, analysis: &AnalysisConfig) -> Result<TestSetup<'a>> {
    let cfg = built.model.config();
    let setup = TestSetup::new(
        built.model.as_ref(),
        &built.data,
        Hypothesis::from_config(cfg)?,
        Hypothesis::background_only(cfg, analysis.alt_poi)?,
        analysis.sidedness,
        ProfilerConfig::default(),
    )?;
    tracing::info!(mu_hat = setup.observed_free().poi_value, nll = setup.observed_free().nll, "observed fit");
    Ok(setup)
}

/// Run `f` with the calculator selected by `analysis.engine`.
pub fn with_calculator<T>(
    built: &BuiltModel,
    analysis: &AnalysisConfig,
    f: impl FnOnce(&dyn HypoTestCalculator) -> Result<T>,
) -> Result<T> {
    let setup = test_setup(built, analysis)?;
    match analysis.engine {
        EngineKind::Asymptotic => {
            let calc = AsymptoticCalculator::new(setup)?;
            f(&calc)
        }
        EngineKind::Toy => {
            let toys = analysis.toy_config();
            tracing::info!(null = toys.n_toys_null, alt = toys.n_toys_alt, seed = toys.seed, "toy engine");
            let calc = FrequentistCalculator::new(setup, toys)?;
            f(&calc)
        }
    }
}

/// Single hypothesis test at `mu`.
pub fn hypotest(built: &BuiltModel, analysis: &AnalysisConfig, mu: f64) -> Result<HypoTestResult> {
    with_calculator(built, analysis, |calc| Ok(calc.hypotest(mu)?))
}

/// CLs scan over `analysis.grid`.
pub fn upper_limits(built: &BuiltModel, analysis: &AnalysisConfig) -> Result<ScanResult> {
    with_calculator(built, analysis, |calc| {
        let scan = HypoTestInverter::new(calc, analysis.inverter())?.run()?;
        tracing::info!(points = scan.points.len(), degraded = scan.degraded.len(), "scan complete");
        Ok(scan)
    })
}

/// Profile likelihood interval at `confidence_level`.
pub fn likelihood_interval(built: &BuiltModel, confidence_level: f64) -> Result<LikelihoodInterval> {
    let profiler = Profiler::new(built.model.as_ref(), ProfilerConfig::default())?;
    let start = built.model.config().snapshot_point()?;
    Ok(ProfileLikelihoodCalculator::new(confidence_level)?.interval(&profiler, &built.data, &start)?)
}

/// Bayesian credible interval.
pub fn bayesian_interval(built: &BuiltModel, config: BayesianConfig) -> Result<BayesianInterval> {
    let profiler = Profiler::new(built.model.as_ref(), ProfilerConfig::default())?;
    let start = built.model.config().snapshot_point()?;
    Ok(BayesianCalculator::new(config)?.interval(&profiler, &built.data, &start)?)
}

pub fn hypotest_json(r: &HypoTestResult, engine: EngineKind) -> serde_json::Value {
    serde_json::json!({
        "engine": engine,
        "mu_test": r.mu_test,
        "t_obs": r.t_obs,
        "mu_hat": r.mu_hat,
        "p_sb": r.p_sb,
        "p_b": r.p_b,
        "clb": r.clb,
        "cls": r.cls,
        "expected_cls": {
            "nsigma_order": EXPECTED_BANDS,
            "cls": r.expected_cls,
        },
        "converged": r.converged,
        "warnings": r.warnings,
        "n_toys_null": r.null_distribution.as_ref().map(|d| d.len()),
        "n_toys_alt": r.alt_distribution.as_ref().map(|d| d.len()),
    })
}

/// Limits plus the raw scan; a missing or ambiguous crossing is reported as
/// `null` with its crossings rather than failing the command.
pub fn limits_json(scan: &ScanResult) -> Result<serde_json::Value> {
    let observed = scan.upper_limit().ok();
    if observed.is_none() {
        tracing::warn!(crossing = ?scan.observed, "no unique observed limit");
    }
    let expected: Vec<Option<f64>> = (0..EXPECTED_BANDS.len()).map(|i| scan.expected_limit(i).ok()).collect();
    Ok(serde_json::json!({
        "confidence_level": scan.confidence_level,
        "obs_limit": observed,
        "exp_limits": {
            "nsigma_order": EXPECTED_BANDS,
            "limits": expected,
        },
        "observed_crossing": scan.observed,
        "expected_crossings": scan.expected,
        "degraded": scan.degraded,
        "points": serde_json::to_value(&scan.points)?,
    }))
}
