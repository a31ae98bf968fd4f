use criterion::{criterion_group, criterion_main};

mod nest;
mod quantile;

criterion_group!(benches_nest, nest::bench_nested_sampler);
criterion_group!(benches_quantile, quantile::bench_weighted_quantile);
criterion_main!(benches_nest, benches_quantile);
