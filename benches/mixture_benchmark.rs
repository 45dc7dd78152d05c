use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use latent_profile::{
    approximate_entropy, component_contributions, sweep_components, CovarianceType, GaussianMixture,
    ModelConfig, SweepConfig,
};
use ndarray::{Array, Array2};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

// Four standardized features, two shifted groups
fn generate_data(n_samples: usize) -> Array2<f64> {
    let mut data = Array::random((n_samples, 4), Normal::new(0., 1.).unwrap());
    for (i, mut row) in data.rows_mut().into_iter().enumerate() {
        if i % 2 == 0 {
            row += 3.0;
        }
    }
    data
}

fn bench_mixture_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("GaussianMixture_fit");
    let data = generate_data(1000);
    group.throughput(Throughput::Elements(data.len() as u64));

    for covariance_type in [
        CovarianceType::Full,
        CovarianceType::Tied,
        CovarianceType::Diag,
        CovarianceType::Spherical,
    ] {
        let config = ModelConfig {
            covariance_type,
            ..ModelConfig::default()
        };
        group.bench_with_input(
            BenchmarkId::new("fit_k3", covariance_type),
            &config,
            |b, config| b.iter(|| GaussianMixture::fit(data.view(), 3, config).unwrap()),
        );
    }
    group.finish();
}

fn bench_diagnostics(c: &mut Criterion) {
    let mut group = c.benchmark_group("diagnostics");
    let data = generate_data(5000);
    let model = GaussianMixture::fit(data.view(), 4, &ModelConfig::default()).unwrap();

    group.bench_function("component_contributions", |b| {
        b.iter(|| component_contributions(&model, data.view()).unwrap())
    });
    group.bench_function("approximate_entropy", |b| b.iter(|| approximate_entropy(&model)));
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_components");
    group.sample_size(10);
    let data = generate_data(500);

    for parallel in [false, true] {
        let sweep = SweepConfig {
            max_components: 6,
            parallel,
            ..SweepConfig::default()
        };
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_with_input(BenchmarkId::new("k1_to_6", label), &sweep, |b, sweep| {
            b.iter(|| sweep_components(data.view(), sweep, &ModelConfig::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mixture_fit, bench_diagnostics, bench_sweep);
criterion_main!(benches);
