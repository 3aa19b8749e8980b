//! Toy-based hypothesis tests: reproducibility, agreement with the asymptotic
//! formulas in the large-count regime, and models with global observables.
//!
//! The full-precision agreement check is slow:
//! `cargo test -p lim-inference --test toy_calculator -- --ignored`

use lim_core::{Dataset, StatModel};
use lim_inference::{
    AsymptoticCalculator, CancelToken, FrequentistCalculator, HypoTestCalculator, HypoTestInverter,
    HypoTestResult, Hypothesis, InverterConfig, ProfilerConfig, ScanGrid, Sidedness, TestSetup,
    ToyConfig,
};
use lim_models::{GaussConstrainedCounting, OnOffCounting, PoissonCounting};

fn setup<'a>(m: &'a dyn StatModel, d: &'a Dataset) -> TestSetup<'a> {
    TestSetup::new(
        m,
        d,
        Hypothesis::from_config(m.config()).unwrap(),
        Hypothesis::background_only(m.config(), 0.0).unwrap(),
        Sidedness::OneSided,
        ProfilerConfig::default(),
    )
    .unwrap()
}

fn toys(n: usize, seed: u64) -> ToyConfig {
    ToyConfig { n_toys_null: n, n_toys_alt: n, seed, ..Default::default() }
}

fn toy_hypotest(m: &dyn StatModel, d: &Dataset, cfg: ToyConfig, mu: f64) -> HypoTestResult {
    FrequentistCalculator::new(setup(m, d), cfg).unwrap().hypotest(mu).unwrap()
}

/// Binomial standard error of `CLs = p_sb / clb` by the delta method.
fn cls_standard_error(p_sb: f64, clb: f64, n_null: usize, n_alt: usize) -> f64 {
    let var_p = p_sb * (1.0 - p_sb) / n_null as f64;
    let var_c = clb * (1.0 - clb) / n_alt as f64;
    (p_sb / clb) * (var_p / (p_sb * p_sb) + var_c / (clb * clb)).sqrt()
}

// ── Reproducibility ─────────────────────────────────────────────────────

#[test]
fn test_toy_cls_reproducible_across_thread_counts() {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let cfg = toys(2000, 1234);

    let serial = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| toy_hypotest(&m, &d, cfg.clone(), 1.0));
    let parallel = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| toy_hypotest(&m, &d, cfg.clone(), 1.0));

    assert_eq!(serial.p_sb.to_bits(), parallel.p_sb.to_bits());
    assert_eq!(serial.clb.to_bits(), parallel.clb.to_bits());
    assert_eq!(serial.cls, parallel.cls);
    assert_eq!(serial.expected_cls, parallel.expected_cls);
    let a = serial.null_distribution.unwrap();
    let b = parallel.null_distribution.unwrap();
    assert_eq!(a.values(), b.values());
    assert_eq!(a.len() + a.n_failed, 2000);

    let cls = serial.cls.value(1.0).unwrap();
    assert!((0.0..=1.0).contains(&cls));
}

#[test]
fn test_different_seed_changes_ensemble() {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let a = toy_hypotest(&m, &d, toys(300, 1), 1.0);
    let b = toy_hypotest(&m, &d, toys(300, 2), 1.0);
    assert_ne!(a.null_distribution.unwrap().values(), b.null_distribution.unwrap().values());
}

// ── Agreement with asymptotics ──────────────────────────────────────────

/// `Poisson(N | 1000 mu + 1e6)` with `N = 1e6`: at `mu = 1`, `q = 1` and
/// `q_A = 1`, so `p_sb = Φ(-1)`, `CLb = 1/2`.
fn high_count_agreement(n_toys: usize, n_se: f64) {
    let m = PoissonCounting::with_yields(1000.0, 1.0e6, (-5.0, 10.0)).unwrap();
    let d = m.observed(1.0e6).unwrap();

    let asym = AsymptoticCalculator::new(setup(&m, &d)).unwrap().hypotest(1.0).unwrap();
    let toy = toy_hypotest(&m, &d, toys(n_toys, 2024), 1.0);

    let se = cls_standard_error(asym.p_sb, asym.clb, n_toys, n_toys);
    let cls_asym = asym.cls.value(1.0).unwrap();
    let cls_toy = toy.cls.value(1.0).unwrap();
    assert!(
        (cls_toy - cls_asym).abs() < n_se * se,
        "toy CLs {cls_toy} vs asymptotic {cls_asym} (se {se})"
    );
    assert!((toy.clb - asym.clb).abs() < n_se * (0.25 / n_toys as f64).sqrt());
}

#[test]
fn test_toys_track_asymptotics_at_high_counts() {
    high_count_agreement(2000, 4.0);
}

#[test]
#[ignore = "slow; run with `cargo test -p lim-inference --test toy_calculator -- --ignored`"]
fn test_toys_agree_with_asymptotics_10k() {
    high_count_agreement(10_000, 2.0);
}

// ── Models with global observables ──────────────────────────────────────

#[test]
fn test_on_off_with_global_control_region() {
    let m = OnOffCounting::new(true, 200.0);
    let d = m.observed(25.0, 200.0).unwrap();
    let r = toy_hypotest(&m, &d, toys(200, 7), 1.0);
    let cls = r.cls.value(1.0).unwrap();
    assert!((0.0..=1.0).contains(&cls));
    let null = r.null_distribution.unwrap();
    assert_eq!(null.len() + null.n_failed, 200);
    assert!(null.values().iter().all(|t| *t >= 0.0));
}

#[test]
fn test_gauss_constrained_toys_run() {
    let m = GaussConstrainedCounting::new();
    let d = m.observed(25.0).unwrap();
    let r = toy_hypotest(&m, &d, toys(200, 11), 1.5);
    assert!((0.0..=1.0).contains(&r.p_sb));
    assert!((0.0..=1.0).contains(&r.clb));
    assert!(r.alt_distribution.unwrap().len() > 150);
}

// ── Inversion and cancellation ──────────────────────────────────────────

#[test]
fn test_toy_scan_brackets_asymptotic_limit() {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let calc = FrequentistCalculator::new(setup(&m, &d), toys(400, 99)).unwrap();
    let cfg = InverterConfig {
        confidence_level: 0.90,
        grid: ScanGrid::Fixed { points: 6, min: 0.0, max: 2.5 },
        parallel: true,
    };
    let scan = HypoTestInverter::new(&calc, cfg).unwrap().run().unwrap();
    assert_eq!(scan.points.len(), 6);
    let curve = scan.curve(None);
    assert!(curve.first().unwrap().1 > 0.5);
    assert!(curve.last().unwrap().1 < 0.05);
    let first = match &scan.observed {
        lim_inference::Crossing::Unique(x) => *x,
        lim_inference::Crossing::Ambiguous { first, .. } => *first,
        lim_inference::Crossing::NotFound => panic!("no crossing on {curve:?}"),
    };
    assert!((0.7..2.0).contains(&first), "toy limit {first}");
}

#[test]
fn test_cancelled_calculator_aborts_scan() {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let cancel = CancelToken::new();
    let calc = FrequentistCalculator::with_cancel(setup(&m, &d), toys(100, 3), cancel.clone()).unwrap();
    cancel.cancel();
    assert!(matches!(calc.hypotest(1.0), Err(lim_core::Error::Cancelled)));
    let inverter = HypoTestInverter::new(&calc, InverterConfig::default()).unwrap();
    assert!(matches!(inverter.run(), Err(lim_core::Error::Cancelled)));
}
