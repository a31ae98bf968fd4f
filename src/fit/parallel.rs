use crate::data::MultiImageLightCurve;
use crate::error::{ConfigurationError, FitError};
use crate::fit::{
    FitConfig, ImageFit, ParallelFitResult, best_candidate, configured_model, cut_range,
    fit_table, guessed_sources, param_quantiles, peak_guess, usable_bands, vparam_names,
};
use crate::micro::MicrolensingEstimator;
use crate::model::PhotometricModel;
use crate::nest::{ParameterBounds, ParameterSpace};
use crate::prior::PriorSource;
use crate::quantile::Quantiles;

use ndarray::{Array1, ArrayView1};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Independent fits of every image
///
/// Images are fitted one by one. The first image gets the configured priors, every following
/// image gets the smoothed posterior of the first one as the prior of the parameters other than
/// the time of peak and the amplitude. Delays and magnifications are the weighted quantiles of
/// the differences of the peak times and the ratios of the amplitudes.
#[derive(Clone, Debug)]
pub struct ParallelFitter<'a, M> {
    models: &'a [M],
    config: &'a FitConfig,
}

impl<'a, M: PhotometricModel> ParallelFitter<'a, M> {
    pub fn new(models: &'a [M], config: &'a FitConfig) -> Self {
        Self { models, config }
    }

    pub fn fit(&self, curves: &MultiImageLightCurve) -> Result<ParallelFitResult, FitError> {
        let curves = usable_bands(curves, self.config)?;
        let fit_order = self.fit_order(&curves)?;
        info!(
            n_images = curves.n_images(),
            reference = %curves.reference,
            ?fit_order,
            "parallel fit started"
        );

        let first = &fit_order[0];
        let (model, first_fit) = best_candidate(
            self.models,
            "parallel",
            |model| self.fit_first(&curves, first, model),
            |(_, fit)| fit.result.logz,
        )?;
        info!(
            image = %first,
            model = model.name(),
            logz = first_fit.result.logz,
            "first image fitted"
        );

        let mut images = BTreeMap::new();
        for image in &fit_order[1..] {
            let fit = self.fit_next(&curves, image, &model, &first_fit)?;
            debug!(image = %image, logz = fit.result.logz, "image fitted");
            images.insert(image.clone(), fit);
        }
        images.insert(first.clone(), first_fit);

        if let Some(micro) = &self.config.microlensing {
            let estimator = MicrolensingEstimator::new(micro.clone());
            for (image, fit) in images.iter_mut() {
                let mut image_model = model.clone();
                fit.model.apply_to(&mut image_model)?;
                let names: Vec<String> = fit
                    .result
                    .vparam_names
                    .iter()
                    .filter(|name| !self.config.ties.contains(name))
                    .cloned()
                    .collect();
                let bounds: ParameterBounds = names
                    .iter()
                    .filter(|name| *name != model.amplitude_name())
                    .filter_map(|name| {
                        let q = fit.param_quantiles.get(name)?;
                        Some((name.clone(), (q.lower, q.upper)))
                    })
                    .collect();
                let summary = estimator.estimate(
                    &image_model,
                    curves.image(image)?,
                    &names,
                    &bounds,
                    &self.config.sampler,
                )?;
                fit.micro = Some(summary);
            }
        }

        let reference = curves.reference.clone();
        let reference_fit = &images[&reference];
        let mut time_delays = BTreeMap::new();
        let mut magnifications = BTreeMap::new();
        for (image, fit) in &images {
            let (delay, magnification) = if *image == reference {
                (Quantiles::exact(0.0), Quantiles::exact(1.0))
            } else {
                relative_to(reference_fit, fit, model.t0_name(), model.amplitude_name())?
            };
            info!(
                image = %image,
                delay = delay.median,
                magnification = magnification.median,
                "parallel estimate"
            );
            time_delays.insert(image.clone(), delay);
            magnifications.insert(image.clone(), magnification);
        }

        Ok(ParallelFitResult {
            reference,
            fit_order,
            images,
            time_delays,
            magnifications,
        })
    }

    /// Configured order with the images it misses appended by descending signal-to-noise
    fn fit_order(&self, curves: &MultiImageLightCurve) -> Result<Vec<String>, FitError> {
        let mut order = match &self.config.fit_order {
            Some(order) => {
                for image in order {
                    curves.check_image(image)?;
                }
                order.clone()
            }
            None => vec![],
        };
        for image in curves.by_signal_to_noise() {
            if !order.contains(&image) {
                order.push(image);
            }
        }
        Ok(order)
    }

    fn fit_first(
        &self,
        curves: &MultiImageLightCurve,
        image: &str,
        model: &M,
    ) -> Result<(M, ImageFit), FitError> {
        let config = self.config;
        let model = configured_model(model, curves, config)?;
        let names = vparam_names(&model, curves, config)?;
        let table = curves.image(image)?;
        let guess = peak_guess(&model, table, image, config)?;
        let table = match cut_range(&model, config, guess.t0) {
            Some((lower, upper)) => table.within_time(lower, upper),
            None => table.clone(),
        };
        let sources = guessed_sources(&model, &names, config, guess);
        let space = ParameterSpace::from_sources(&names, &sources, &config.ties)?;
        let (best, result) = fit_table(&model, &table, &space, config)?;
        let fit = ImageFit {
            model: best.state(),
            param_quantiles: param_quantiles(&result)?,
            result,
            micro: None,
        };
        Ok((model, fit))
    }

    /// Fit with the posterior of the first image as the prior of the shared parameters
    fn fit_next(
        &self,
        curves: &MultiImageLightCurve,
        image: &str,
        model: &M,
        first: &ImageFit,
    ) -> Result<ImageFit, FitError> {
        let config = self.config;
        let mut model = model.clone();
        first.model.apply_to(&mut model)?;
        let table = curves.image(image)?;
        let guess = peak_guess(&model, table, image, config)?;
        let table = match cut_range(&model, config, guess.t0) {
            Some((lower, upper)) => table.within_time(lower, upper),
            None => table.clone(),
        };

        let names = &first.result.vparam_names;
        let mut sources = BTreeMap::new();
        for (name, column) in names.iter().zip(first.result.samples.columns()) {
            let source = if name == model.t0_name() {
                config
                    .bounds
                    .get(name)
                    .map(|(lower, upper)| PriorSource::flat(lower + guess.t0, upper + guess.t0))
            } else if name == model.amplitude_name() {
                Some(PriorSource::flat(0.0, 10.0 * guess.amplitude))
            } else {
                Some(PriorSource::Empirical {
                    samples: column.to_vec(),
                    weights: first.result.weights.to_vec(),
                })
            };
            if let Some(source) = source {
                sources.insert(name.clone(), source);
            }
        }
        let space = ParameterSpace::from_sources(names, &sources, &config.ties)?;
        let (best, result) = fit_table(&model, &table, &space, config)?;
        Ok(ImageFit {
            model: best.state(),
            param_quantiles: param_quantiles(&result)?,
            result,
            micro: None,
        })
    }
}

/// Delay and magnification of `fit` relative to `reference`
///
/// Posterior samples of the two fits are independent and may differ in number. They are paired
/// by rank of their own weights, heaviest first, and the longer set is truncated. Each pair is
/// weighted by the product of the two weights.
fn relative_to(
    reference: &ImageFit,
    fit: &ImageFit,
    t0_name: &str,
    amplitude_name: &str,
) -> Result<(Quantiles, Quantiles), FitError> {
    let (t_ref, a_ref) = (column(reference, t0_name)?, column(reference, amplitude_name)?);
    let (t, a) = (column(fit, t0_name)?, column(fit, amplitude_name)?);

    let ref_order = reference.result.by_weight();
    let order = fit.result.by_weight();
    let n = ref_order.len().min(order.len());
    let pairs = || ref_order.iter().zip(order.iter()).take(n);

    let weights: Array1<f64> = pairs()
        .map(|(&i, &j)| reference.result.weights[i] * fit.result.weights[j])
        .collect();
    let delays: Array1<f64> = pairs().map(|(&i, &j)| t[j] - t_ref[i]).collect();
    let ratios: Array1<f64> = pairs().map(|(&i, &j)| a[j] / a_ref[i]).collect();
    Ok((
        Quantiles::from_weighted(delays.view(), weights.view())?,
        Quantiles::from_weighted(ratios.view(), weights.view())?,
    ))
}

fn column<'f>(fit: &'f ImageFit, name: &str) -> Result<ArrayView1<'f, f64>, ConfigurationError> {
    fit.result
        .column(name)
        .ok_or_else(|| ConfigurationError::UnknownParameter {
            param: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitMethod, fit};
    use crate::model::BazinModel;
    use crate::nest::{FitResult, SamplerConfig};
    use crate::tests::*;

    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn image_fit(t0: Vec<f64>, amplitude: Vec<f64>, weights: Vec<f64>) -> ImageFit {
        let n = t0.len();
        let samples = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { t0[i] } else { amplitude[i] });
        let logwt = Array1::from(weights).mapv(f64::ln);
        let result = FitResult::new(
            vec!["t0".to_owned(), "amplitude".to_owned()],
            samples,
            logwt,
            Array1::zeros(n),
            0.0,
            1.0,
            n,
            n,
        )
        .unwrap();
        ImageFit {
            model: BazinModel::default().state(),
            param_quantiles: param_quantiles(&result).unwrap(),
            result,
            micro: None,
        }
    }

    #[test]
    fn rank_matching_truncates_to_shorter_set() {
        let reference = image_fit(vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 4.0], vec![0.2, 0.5, 0.3]);
        let other = image_fit(vec![10.0, 12.0], vec![8.0, 2.0], vec![0.4, 0.6]);
        let (delay, magnification) = relative_to(&reference, &other, "t0", "amplitude").unwrap();
        // pairs by weight: (1.0, 12.0) weight 0.30 and (2.0, 10.0) weight 0.12
        assert!(delay.lower >= 8.0 && delay.upper <= 11.0);
        assert_abs_diff_eq!(delay.median, 11.0, epsilon = 1.5);
        assert!(magnification.lower >= 1.0 && magnification.upper <= 2.0);
    }

    #[test]
    fn rank_matching_is_deterministic() {
        let reference = image_fit(vec![0.0, 1.0, 2.0], vec![1.0, 1.0, 1.0], vec![1.0, 1.0, 1.0]);
        let other = image_fit(vec![5.0, 6.0, 7.0], vec![2.0, 2.0, 2.0], vec![1.0, 1.0, 1.0]);
        let first = relative_to(&reference, &other, "t0", "amplitude").unwrap();
        let second = relative_to(&reference, &other, "t0", "amplitude").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.0, Quantiles::exact(5.0));
        assert_eq!(first.1, Quantiles::exact(2.0));
    }

    #[test]
    fn explicit_fit_order_is_completed() {
        let (curves, _) = lensed_pair(0, &["r"], 10.0, 2.0);
        let config = FitConfig {
            fit_order: Some(vec!["image_2".to_owned()]),
            ..FitConfig::default()
        };
        let models = [BazinModel::default()];
        let fitter = ParallelFitter::new(&models, &config);
        assert_eq!(fitter.fit_order(&curves).unwrap(), ["image_2", "image_1"]);

        let config = FitConfig {
            fit_order: Some(vec!["image_7".to_owned()]),
            ..FitConfig::default()
        };
        assert!(ParallelFitter::new(&models, &config).fit_order(&curves).is_err());
    }

    #[test]
    fn identical_images_have_no_delay() {
        let (curves, _) = identical_pair(11, &["g", "r"]);
        let config = fit_config(SamplerConfig::default().with_seed(Some(1)));
        let curves = fit(
            &curves,
            &[BazinModel::default()],
            &config,
            FitMethod::Parallel,
            None,
        )
        .unwrap();
        let parallel = curves.parallel.unwrap();
        assert_eq!(parallel.time_delays["image_1"], Quantiles::exact(0.0));
        let delay = parallel.time_delays["image_2"];
        let magnification = parallel.magnifications["image_2"];
        assert!(delay.lower <= 0.0 && 0.0 <= delay.upper, "{delay:?}");
        assert!(
            magnification.lower <= 1.0 && 1.0 <= magnification.upper,
            "{magnification:?}"
        );
        assert_eq!(parallel.fit_order.len(), 2);
        assert_eq!(parallel.model_name(), Some("bazin"));
    }

    #[test]
    fn recovers_injected_delay() {
        let (curves, _) = lensed_pair(12, &["g", "r"], 10.0, 2.0);
        let config = fit_config(SamplerConfig::default().with_seed(Some(2)));
        let parallel = ParallelFitter::new(&[BazinModel::default()], &config)
            .fit(&curves)
            .unwrap();
        let delay = parallel.time_delays["image_2"];
        let magnification = parallel.magnifications["image_2"];
        assert_abs_diff_eq!(delay.median, 10.0, epsilon = 3.0 * delay.sigma() + 0.2);
        assert_abs_diff_eq!(
            magnification.median,
            2.0,
            epsilon = 3.0 * magnification.sigma() + 0.05
        );
    }
}
