use criterion::Criterion;
use light_curve_time_delay::weighted_quantile;
use ndarray::Array1;
use rand::prelude::*;
use std::hint::black_box;

pub fn bench_weighted_quantile(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    for n in [100, 10_000, 1_000_000] {
        let x: Array1<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
        let w: Array1<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
        c.bench_function(format!("Weighted quantiles: {n} samples").as_str(), |b| {
            b.iter(|| weighted_quantile(black_box(x.view()), &[0.16, 0.5, 0.84], w.view()))
        });
    }
}
