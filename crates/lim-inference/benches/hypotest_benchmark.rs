use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lim_core::StatModel;
use lim_inference::{
    AsymptoticCalculator, FrequentistCalculator, HypoTestCalculator, HypoTestInverter, Hypothesis,
    InverterConfig, ProfilerConfig, ScanGrid, Sidedness, TestSetup, ToyConfig,
};
use lim_models::PoissonCounting;
use std::hint::black_box;

fn counting_setup<'a>(m: &'a PoissonCounting, d: &'a lim_core::Dataset) -> TestSetup<'a> {
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

fn bench_calculator_build(c: &mut Criterion) {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();

    c.bench_function("asymptotic_calculator_build_counting", |b| {
        b.iter(|| {
            let calc = AsymptoticCalculator::new(counting_setup(black_box(&m), black_box(&d))).unwrap();
            drop(black_box(calc));
        })
    });
}

fn bench_hypotest_single(c: &mut Criterion) {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let calc = AsymptoticCalculator::new(counting_setup(&m, &d)).unwrap();

    let mut group = c.benchmark_group("hypotest_asymptotic");
    for mu in [0.5f64, 1.0, 2.0] {
        group.bench_with_input(BenchmarkId::new("counting", mu), &mu, |b, &mu| {
            b.iter(|| black_box(calc.hypotest(black_box(mu))).unwrap())
        });
    }
    group.finish();
}

fn bench_upper_limit(c: &mut Criterion) {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();
    let calc = AsymptoticCalculator::new(counting_setup(&m, &d)).unwrap();
    let cfg = InverterConfig {
        confidence_level: 0.95,
        grid: ScanGrid::Adaptive { lo: 0.0, hi: 2.0, rtol: 1e-4, max_iter: 80 },
        parallel: false,
    };

    c.bench_function("upper_limit_adaptive_counting", |b| {
        b.iter(|| {
            let scan = HypoTestInverter::new(&calc, cfg.clone()).unwrap().run().unwrap();
            black_box(scan.upper_limit().unwrap())
        })
    });
}

fn bench_toy_ensembles(c: &mut Criterion) {
    let m = PoissonCounting::new();
    let d = m.observed(25.0).unwrap();

    let mut group = c.benchmark_group("hypotest_toys");
    group.sample_size(10);
    for n_toys in [100usize, 1_000] {
        let cfg = ToyConfig { n_toys_null: n_toys, n_toys_alt: n_toys, seed: 7, ..Default::default() };
        let calc = FrequentistCalculator::new(counting_setup(&m, &d), cfg).unwrap();
        group.bench_with_input(BenchmarkId::new("counting", n_toys), &n_toys, |b, _| {
            b.iter(|| black_box(calc.hypotest(black_box(1.0))).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_calculator_build,
    bench_hypotest_single,
    bench_upper_limit,
    bench_toy_ensembles
);
criterion_main!(benches);
