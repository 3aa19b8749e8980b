//! limitscan CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use lim_core::StatModel;
use lim_inference::{
    profile_likelihood, AnalysisConfig, BayesTail, BayesianConfig, EngineKind, PoiConstraint, Prior,
    Profiler, ProfilerConfig, ScanGrid, Sidedness, ToyCounts,
};
use std::path::PathBuf;

mod analysis;
mod run;

#[derive(Parser)]
#[command(name = "limitscan")]
#[command(about = "limitscan - CLs limits, likelihood intervals and credible intervals")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Options selecting the hypotheses and the sampling-distribution engine.
#[derive(clap::Args, Clone)]
struct TestArgs {
    /// POI value of the background-only hypothesis
    #[arg(long, default_value = "0.0")]
    alt_poi: f64,

    /// Use the two-sided statistic (no clamp for mu_hat > mu)
    #[arg(long)]
    two_sided: bool,

    /// Throw this many toys per hypothesis instead of using asymptotics
    #[arg(long)]
    toys: Option<usize>,

    /// Base seed for toys
    #[arg(long, default_value = "0")]
    seed: u64,
}

impl TestArgs {
    fn analysis(&self, confidence_level: f64) -> AnalysisConfig {
        let mut cfg = AnalysisConfig {
            confidence_level,
            sidedness: if self.two_sided { Sidedness::TwoSided } else { Sidedness::OneSided },
            alt_poi: self.alt_poi,
            ..Default::default()
        };
        if let Some(n) = self.toys {
            cfg.engine = EngineKind::Toy;
            cfg.toys = ToyCounts { null: n, alt: n, seed: self.seed };
        }
        cfg
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TailArg {
    Central,
    Upper,
    Shortest,
}

impl From<TailArg> for BayesTail {
    fn from(t: TailArg) -> Self {
        match t {
            TailArg::Central => BayesTail::Central,
            TailArg::Upper => BayesTail::Upper,
            TailArg::Shortest => BayesTail::Shortest,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorArg {
    Flat,
    InverseSqrt,
}

#[derive(Subcommand)]
enum Commands {
    /// Unconditional maximum-likelihood fit
    Fit {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// CLs hypothesis test at one POI value
    Hypotest {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Tested POI value (mu)
        #[arg(long)]
        mu: f64,

        #[command(flatten)]
        test: TestArgs,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Observed and expected CLs upper limits
    UpperLimit {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Confidence level of the limit
        #[arg(long, default_value = "0.95")]
        cl: f64,

        /// Use scan mode: scan start (mu). Requires `--scan-stop` and `--scan-points`.
        #[arg(long, requires_all = ["scan_stop", "scan_points"])]
        scan_start: Option<f64>,

        /// Use scan mode: scan stop (mu). Requires `--scan-start` and `--scan-points`.
        #[arg(long, requires_all = ["scan_start", "scan_points"])]
        scan_stop: Option<f64>,

        /// Use scan mode: number of scan points (inclusive). Requires `--scan-start` and `--scan-stop`.
        #[arg(long, requires_all = ["scan_start", "scan_stop"])]
        scan_points: Option<usize>,

        /// Lower bracket (mu)
        #[arg(long, default_value = "0.0")]
        lo: f64,

        /// Initial upper bracket (mu); widened until it brackets the limit
        #[arg(long, default_value = "1.0")]
        hi: f64,

        /// Relative tolerance for bisection
        #[arg(long, default_value = "0.0001")]
        rtol: f64,

        /// Max bisection iterations
        #[arg(long, default_value = "80")]
        max_iter: usize,

        #[command(flatten)]
        test: TestArgs,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Profile likelihood scan over POI values
    Scan {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Scan start (mu)
        #[arg(long, default_value = "0.0")]
        start: f64,

        /// Scan stop (mu)
        #[arg(long, default_value = "5.0")]
        stop: f64,

        /// Number of points (inclusive)
        #[arg(long, default_value = "21")]
        points: usize,

        /// Use the one-sided statistic
        #[arg(long)]
        one_sided: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Profile likelihood confidence interval
    Interval {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Confidence level
        #[arg(long, default_value = "0.6827")]
        cl: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Bayesian credible interval
    Bayes {
        /// Model file (YAML, or JSON by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Credibility level
        #[arg(long, default_value = "0.95")]
        cl: f64,

        /// Interval policy
        #[arg(long, value_enum, default_value = "central")]
        tail: TailArg,

        /// POI prior
        #[arg(long, value_enum, default_value = "flat")]
        prior: PriorArg,

        /// Posterior bins across the POI range
        #[arg(long, default_value = "500")]
        bins: usize,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Full analysis from a run file (model + analysis options)
    Run {
        /// Run file (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fit { input, output } => cmd_fit(&input, output.as_ref()),
        Commands::Hypotest { input, mu, test, output, threads } => {
            cmd_hypotest(&input, mu, &test, output.as_ref(), threads)
        }
        Commands::UpperLimit {
            input,
            cl,
            scan_start,
            scan_stop,
            scan_points,
            lo,
            hi,
            rtol,
            max_iter,
            test,
            output,
            threads,
        } => {
            let grid = match (scan_start, scan_stop, scan_points) {
                (Some(min), Some(max), Some(points)) => ScanGrid::Fixed { points, min, max },
                _ => ScanGrid::Adaptive { lo, hi, rtol, max_iter },
            };
            cmd_upper_limit(&input, cl, grid, &test, output.as_ref(), threads)
        }
        Commands::Scan { input, start, stop, points, one_sided, output } => {
            cmd_scan(&input, start, stop, points, one_sided, output.as_ref())
        }
        Commands::Interval { input, cl, output } => cmd_interval(&input, cl, output.as_ref()),
        Commands::Bayes { input, cl, tail, prior, bins, output, threads } => {
            cmd_bayes(&input, cl, tail, prior, bins, output.as_ref(), threads)
        }
        Commands::Run { config, output } => cmd_run(&config, output.as_ref()),
    }
}

fn load_model(input: &PathBuf) -> Result<lim_models::BuiltModel> {
    tracing::info!(path = %input.display(), "loading model");
    let spec = analysis::read_model_spec(input)?;
    analysis::build_model(&spec)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn cmd_fit(input: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let built = load_model(input)?;
    let profiler = Profiler::new(built.model.as_ref(), ProfilerConfig::default())?;
    let start = built.model.config().snapshot_point()?;
    let r = profiler.profile(&built.data, &start, PoiConstraint::Free)?;
    tracing::info!(nll = r.nll, converged = r.converged(), "fit complete");

    let output_json = serde_json::json!({
        "parameter_names": r.point.names(),
        "poi": built.model.config().poi_name()?,
        "bestfit": r.point.values(),
        "mu_hat": r.poi_value,
        "nll": r.nll,
        "twice_nll": 2.0 * r.nll,
        "status": r.status,
        "converged": r.converged(),
        "at_boundary": r.at_boundary,
        "n_iter": r.n_iter,
        "n_fev": r.n_fev,
    });

    write_json(output, output_json)
}

fn cmd_hypotest(
    input: &PathBuf,
    mu: f64,
    test: &TestArgs,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    analysis::init_threads(threads);
    let built = load_model(input)?;
    let cfg = test.analysis(0.95);
    cfg.validate()?;
    let r = analysis::hypotest(&built, &cfg, mu)?;
    tracing::debug!(mu_test = r.mu_test, cls = ?r.cls, mu_hat = r.mu_hat, "hypotest result");
    write_json(output, analysis::hypotest_json(&r, cfg.engine))
}

fn cmd_upper_limit(
    input: &PathBuf,
    cl: f64,
    grid: ScanGrid,
    test: &TestArgs,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    analysis::init_threads(threads);
    let built = load_model(input)?;
    let cfg = AnalysisConfig { grid, ..test.analysis(cl) };
    cfg.validate()?;
    let scan = analysis::upper_limits(&built, &cfg)?;
    let mut out = analysis::limits_json(&scan)?;
    out["engine"] = serde_json::to_value(cfg.engine)?;
    out["grid"] = serde_json::to_value(&cfg.grid)?;
    write_json(output, out)
}

fn cmd_scan(
    input: &PathBuf,
    start: f64,
    stop: f64,
    points: usize,
    one_sided: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let grid = ScanGrid::Fixed { points, min: start, max: stop };
    grid.validate()?;
    let built = load_model(input)?;
    let profiler = Profiler::new(built.model.as_ref(), ProfilerConfig::default())?;
    let init = built.model.config().snapshot_point()?;
    let sidedness = if one_sided { Sidedness::OneSided } else { Sidedness::TwoSided };
    let mu_values = grid.values().unwrap_or_default();
    let scan = profile_likelihood::scan(&profiler, &built.data, &init, &mu_values, sidedness)?;
    tracing::info!(points = scan.points.len(), mu_hat = scan.mu_hat, "scan complete");

    write_json(output, serde_json::to_value(&scan)?)
}

fn cmd_interval(input: &PathBuf, cl: f64, output: Option<&PathBuf>) -> Result<()> {
    let built = load_model(input)?;
    let interval = analysis::likelihood_interval(&built, cl)?;
    tracing::info!(lower = interval.lower, upper = interval.upper, "interval complete");
    write_json(output, serde_json::to_value(&interval)?)
}

fn cmd_bayes(
    input: &PathBuf,
    cl: f64,
    tail: TailArg,
    prior: PriorArg,
    bins: usize,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    analysis::init_threads(threads);
    let built = load_model(input)?;
    let config = BayesianConfig {
        confidence_level: cl,
        tail: BayesTail::from(tail).into(),
        prior: match prior {
            PriorArg::Flat => Prior::Flat,
            PriorArg::InverseSqrt => Prior::InverseSqrt,
        },
        n_scan: bins,
        ..BayesianConfig::default()
    };
    let interval = analysis::bayesian_interval(&built, config)?;
    tracing::info!(lower = interval.lower, upper = interval.upper, "credible interval complete");
    write_json(output, serde_json::to_value(&interval)?)
}

fn cmd_run(config: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    tracing::info!(path = %config.display(), "loading run config");
    let cfg = run::read_run_config(config)?;
    let out = run::execute(&cfg)?;
    write_json(output, out)
}
