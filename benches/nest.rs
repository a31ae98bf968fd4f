use criterion::Criterion;
use light_curve_time_delay::nest::{ChiSquare, ParameterSpace};
use light_curve_time_delay::{
    BazinModel, LightCurveTable, NestedSampler, PhotometricModel, PriorSource, SamplerConfig,
    SamplerMethod, Ties,
};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::collections::BTreeMap;
use std::hint::black_box;

fn light_curve(model: &BazinModel) -> LightCurveTable {
    let mut rng = StdRng::seed_from_u64(0);
    let time: Vec<f64> = (0..100).map(|i| 20.0 + 1.5 * i as f64).collect();
    let n = time.len();
    let flux: Vec<f64> = time
        .iter()
        .map(|&t| {
            let noise: f64 = rng.sample(StandardNormal);
            model.bandflux(model.parameters(), "r", t, 25.0, "ab") + 2.0 * noise
        })
        .collect();
    LightCurveTable::new(
        time,
        vec!["r".to_owned(); n],
        flux,
        vec![2.0; n],
        vec![25.0; n],
        vec!["ab".to_owned(); n],
    )
    .unwrap()
}

pub fn bench_nested_sampler(c: &mut Criterion) {
    let mut model = BazinModel::default();
    for (name, value) in [("t0", 60.0), ("amplitude", 100.0), ("rise", 3.0), ("fall", 20.0)] {
        model.set(name, value).unwrap();
    }
    let data = light_curve(&model);
    let names: Vec<String> = ["t0", "amplitude", "rise", "fall"]
        .iter()
        .map(|&s| s.to_owned())
        .collect();
    let sources = BTreeMap::from([
        ("t0".to_owned(), PriorSource::flat(45.0, 75.0)),
        ("amplitude".to_owned(), PriorSource::flat(10.0, 1000.0)),
        ("rise".to_owned(), PriorSource::flat(1.0, 6.0)),
        ("fall".to_owned(), PriorSource::flat(10.0, 40.0)),
    ]);
    let space = ParameterSpace::from_sources(&names, &sources, &Ties::new()).unwrap();
    let chi2 = ChiSquare::new(&model, &data, false);
    // t0, amplitude, rise and fall are the four last Bazin parameters, z is fixed at zero
    let full = |v: &[f64]| [0.0, v[0], v[1], v[2], v[3]];

    for method in [SamplerMethod::Single, SamplerMethod::Classic] {
        let sampler = NestedSampler::new(SamplerConfig::new(method, 100).with_seed(Some(0)));
        c.bench_function(format!("Nested sampling: Bazin fit, {method:?}").as_str(), |b| {
            b.iter(|| {
                sampler
                    .run(black_box(&space), |v| chi2.loglike(&full(v)))
                    .unwrap()
            })
        });
    }
}
