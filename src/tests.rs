//! Synthetic lensed light curves shared by unit tests

use crate::data::{LightCurveTable, MultiImageLightCurve};
use crate::fit::FitConfig;
use crate::model::{BazinModel, PhotometricModel};
use crate::nest::{ParameterBounds, SamplerConfig};

use ndarray::Array1;
use rand::prelude::*;
use rand_distr::StandardNormal;

pub const TRUE_T0: f64 = 60.0;
pub const TRUE_AMPLITUDE: f64 = 100.0;
pub const FLUX_ERROR: f64 = 2.0;

/// Parameters a synthetic light curve was generated with
#[derive(Clone, Debug)]
pub struct Truth {
    pub model: BazinModel,
    pub delay: f64,
    pub magnification: f64,
}

pub fn true_model() -> BazinModel {
    let mut model = BazinModel::default();
    for (name, value) in [
        ("z", 0.0),
        ("t0", TRUE_T0),
        ("amplitude", TRUE_AMPLITUDE),
        ("rise", 3.0),
        ("fall", 20.0),
    ] {
        model.set(name, value).unwrap();
    }
    model
}

/// Every band observed at every step, with fluxes of the model itself and unit errors
pub fn noiseless_table(
    model: &BazinModel,
    bands: &[&str],
    start: f64,
    end: f64,
    step: f64,
) -> LightCurveTable {
    let n = ((end - start) / step).floor() as usize + 1;
    let mut time = vec![];
    let mut band = vec![];
    for i in 0..n {
        for &b in bands {
            time.push(start + step * i as f64);
            band.push(b.to_owned());
        }
    }
    let flux: Vec<f64> = time
        .iter()
        .zip(band.iter())
        .map(|(&t, b)| model.bandflux(model.parameters(), b, t, 25.0, "ab"))
        .collect();
    let n = time.len();
    LightCurveTable::new(
        time,
        band,
        flux,
        vec![1.0; n],
        vec![25.0; n],
        vec!["ab".to_owned(); n],
    )
    .unwrap()
}

/// Light curve of an image delayed by `delay` and magnified by `magnification`
///
/// Observations are made every two days from day 20 to day 160, the bands of a visit are taken
/// a tenth of a day apart.
fn image_table(
    rng: &mut StdRng,
    model: &BazinModel,
    bands: &[&str],
    delay: f64,
    magnification: f64,
) -> LightCurveTable {
    let visits = Array1::range(20.0, 160.0, 2.0);
    let mut time = vec![];
    let mut band = vec![];
    let mut flux = vec![];
    for &visit in &visits {
        for (i, &b) in bands.iter().enumerate() {
            let t = visit + 0.1 * i as f64;
            let noise: f64 = rng.sample(StandardNormal);
            time.push(t);
            band.push(b.to_owned());
            flux.push(
                magnification * model.bandflux(model.parameters(), b, t - delay, 25.0, "ab")
                    + FLUX_ERROR * noise,
            );
        }
    }
    let n = time.len();
    LightCurveTable::new(
        time,
        band,
        flux,
        vec![FLUX_ERROR; n],
        vec![25.0; n],
        vec!["ab".to_owned(); n],
    )
    .unwrap()
}

/// Single noisy image of the true model
pub fn unlensed_single_image(seed: u64) -> (BazinModel, LightCurveTable) {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = true_model();
    let table = image_table(&mut rng, &model, &["g", "r"], 0.0, 1.0);
    (model, table)
}

/// Images `image_1` and `image_2` with independent noise, the second one delayed and magnified
pub fn lensed_pair(
    seed: u64,
    bands: &[&str],
    delay: f64,
    magnification: f64,
) -> (MultiImageLightCurve, Truth) {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = true_model();
    let first = image_table(&mut rng, &model, bands, 0.0, 1.0);
    let second = image_table(&mut rng, &model, bands, delay, magnification);
    let curves = MultiImageLightCurve::new([
        ("image_1".to_owned(), first),
        ("image_2".to_owned(), second),
    ])
    .unwrap();
    let truth = Truth {
        model,
        delay,
        magnification,
    };
    (curves, truth)
}

/// Two images with the same noise realization
pub fn identical_pair(seed: u64, bands: &[&str]) -> (MultiImageLightCurve, Truth) {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = true_model();
    let table = image_table(&mut rng, &model, bands, 0.0, 1.0);
    let curves = MultiImageLightCurve::new([
        ("image_1".to_owned(), table.clone()),
        ("image_2".to_owned(), table),
    ])
    .unwrap();
    let truth = Truth {
        model,
        delay: 0.0,
        magnification: 1.0,
    };
    (curves, truth)
}

/// Multiply the fluxes of `band` in `image` by random factors of order e
pub fn corrupted_band(
    mut curves: MultiImageLightCurve,
    image: &str,
    band: &str,
    seed: u64,
) -> MultiImageLightCurve {
    let mut rng = StdRng::seed_from_u64(seed);
    let table = curves.images.get_mut(image).unwrap();
    for i in 0..table.len() {
        if table.band[i] == band {
            let noise: f64 = rng.sample(StandardNormal);
            table.flux[i] *= noise.exp();
        }
    }
    curves
}

/// Bazin fit with `t0`, `amplitude`, `rise` and `fall` sampled and zero redshift
pub fn fit_config(sampler: SamplerConfig) -> FitConfig {
    let params = ["t0", "amplitude", "rise", "fall"]
        .iter()
        .map(|&name| name.to_owned())
        .collect();
    let bounds = ParameterBounds::new()
        .with("t0", -15.0, 15.0)
        .with("rise", 1.0, 6.0)
        .with("fall", 10.0, 40.0)
        .with(FitConfig::DELAY_BOUNDS, -10.0, 10.0)
        .with(FitConfig::MAGNIFICATION_BOUNDS, 0.5, 2.0);
    FitConfig::new(params, bounds)
        .with_constant("z", 0.0)
        .with_sampler(sampler)
}
