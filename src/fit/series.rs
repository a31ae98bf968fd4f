use crate::data::{CombinedLightCurve, MultiImageLightCurve};
use crate::error::{ConfigurationError, DataError, FitError};
use crate::fit::{
    Alignment, FitConfig, ParallelFitResult, SeriesFitResult, best_candidate, best_model,
    configured_model, cut_range, delay_param, delay_range, joint_sources, magnification_param,
    magnification_range, param_quantiles, usable_bands, vparam_names, with_peak,
};
use crate::micro::{MicrolensingEstimator, MicrolensingSummary};
use crate::model::{ParamMap, PhotometricModel};
use crate::nest::{ChiSquare, NestedSampler, ParameterBounds, ParameterSpace};
use crate::prior::PriorSource;

use std::collections::BTreeMap;
use tracing::{debug, info};

/// Joint fit of all images with a single model
///
/// Images are first aligned to the reference with initial delays and magnifications, taken from
/// a [ParallelFitResult] when given or from the peak guesses of every image. The joint fit then
/// samples the model parameters together with a time offset `t_<image>` and a flux scale
/// `a_<image>` per image relative to this alignment, the offsets of the reference image are
/// tied to zero and one.
#[derive(Clone, Debug)]
pub struct SeriesFitter<'a, M> {
    models: &'a [M],
    config: &'a FitConfig,
}

/// Best-fit model together with the output, the model is needed for microlensing
struct SeriesCandidate<M> {
    model: M,
    fit: SeriesFitResult,
}

impl<'a, M: PhotometricModel> SeriesFitter<'a, M> {
    pub fn new(models: &'a [M], config: &'a FitConfig) -> Self {
        Self { models, config }
    }

    pub fn fit(
        &self,
        curves: &MultiImageLightCurve,
        prior: Option<&ParallelFitResult>,
    ) -> Result<SeriesFitResult, FitError> {
        let curves = usable_bands(curves, self.config)?;
        info!(
            n_images = curves.n_images(),
            reference = %curves.reference,
            with_prior = prior.is_some(),
            "series fit started"
        );
        let SeriesCandidate { model, mut fit } = best_candidate(
            self.models,
            "series",
            |model| self.fit_model(&curves, model, prior),
            |candidate| candidate.fit.result.logz,
        )?;
        for (image, delay) in &fit.time_delays {
            info!(
                image = %image,
                delay = delay.median,
                magnification = fit.magnifications[image].median,
                "series estimate"
            );
        }
        if self.config.microlensing.is_some() {
            fit.micro = self.microlensing(&model, &fit)?;
        }
        Ok(fit)
    }

    fn fit_model(
        &self,
        curves: &MultiImageLightCurve,
        model: &M,
        prior: Option<&ParallelFitResult>,
    ) -> Result<SeriesCandidate<M>, FitError> {
        let config = self.config;
        let reference = curves.reference.as_str();
        let model = configured_model(model, curves, config)?;
        let alignment = Alignment::new(curves, &model, config, prior)?;
        let model = with_peak(&model, alignment.t0, alignment.amplitude)?;
        debug!(
            delays = ?alignment.delays,
            magnifications = ?alignment.magnifications,
            "initial alignment"
        );

        let combined =
            CombinedLightCurve::new(curves, &alignment.delays, &alignment.magnifications);
        let combined = match cut_range(&model, config, alignment.t0) {
            Some((lower, upper)) => combined.within_time(lower, upper),
            None => combined,
        };
        if combined.table.is_empty() {
            return Err(DataError::NoDataInDomain {
                image: "combined light curve".to_owned(),
            }
            .into());
        }

        let mut names = vparam_names(&model, curves, config)?;
        let mut sources = joint_sources(&model, &names, config, &alignment, reference, prior);
        let mut ties = config.ties.clone();
        for image in curves.image_names() {
            let (t_name, a_name) = (delay_param(image), magnification_param(image));
            if image == reference {
                ties = ties.with(t_name.clone(), |_| 0.0).with(a_name.clone(), |_| 1.0);
            } else {
                if let Some((lower, upper)) = delay_range(image, config, prior) {
                    sources.insert(t_name.clone(), PriorSource::flat(lower, upper));
                }
                if let Some((lower, upper)) = magnification_range(image, config, prior) {
                    sources.insert(a_name.clone(), PriorSource::flat(lower, upper));
                }
            }
            names.push(t_name);
            names.push(a_name);
        }
        let space = ParameterSpace::from_sources(&names, &sources, &ties)?;

        let index = |name: String| {
            space
                .index_of(&name)
                .ok_or(ConfigurationError::MissingPrior { param: name })
        };
        let t_index = combined
            .image_names
            .iter()
            .map(|image| index(delay_param(image)))
            .collect::<Result<Vec<_>, _>>()?;
        let a_index = combined
            .image_names
            .iter()
            .map(|image| index(magnification_param(image)))
            .collect::<Result<Vec<_>, _>>()?;

        let map = ParamMap::new(&model, space.names());
        let chi2 = ChiSquare::new(&model, &combined.table, config.model_covariance);
        let result = NestedSampler::new(config.sampler.clone()).run(&space, |v| {
            chi2.loglike_shifted(&map.full(v), |i| {
                let image = combined.image[i];
                (v[t_index[image]], v[a_index[image]])
            })
        })?;

        let best = best_model(&model, &result)?;
        let param_quantiles = param_quantiles(&result)?;
        let param = |name: &str| {
            best.get(name).ok_or_else(|| ConfigurationError::UnknownParameter {
                param: name.to_owned(),
            })
        };
        let (t0, amplitude) = (param(best.t0_name())?, param(best.amplitude_name())?);

        let mut time_delays = BTreeMap::new();
        let mut magnifications = BTreeMap::new();
        let mut t_peaks = BTreeMap::new();
        let mut a_peaks = BTreeMap::new();
        for image in curves.image_names() {
            let quantile = |name: String| {
                param_quantiles
                    .get(&name)
                    .copied()
                    .ok_or(ConfigurationError::UnknownParameter { param: name })
            };
            let t_offset = quantile(delay_param(image))?;
            let a_offset = quantile(magnification_param(image))?;
            let (delay0, magnification0) =
                (alignment.delay(image), alignment.magnification(image));
            time_delays.insert(image.to_owned(), t_offset.shifted(delay0));
            magnifications.insert(image.to_owned(), a_offset.scaled(magnification0));
            t_peaks.insert(image.to_owned(), t0 + delay0 + t_offset.median);
            a_peaks.insert(image.to_owned(), amplitude * magnification0 * a_offset.median);
        }

        let median_delays = time_delays.iter().map(|(k, q)| (k.clone(), q.median)).collect();
        let median_magnifications = magnifications
            .iter()
            .map(|(k, q)| (k.clone(), q.median))
            .collect();
        let combined = CombinedLightCurve::new(curves, &median_delays, &median_magnifications);

        let fit = SeriesFitResult {
            reference: reference.to_owned(),
            model: best.state(),
            result,
            param_quantiles,
            time_delays,
            magnifications,
            t_peaks,
            a_peaks,
            initial_delays: alignment.delays,
            initial_magnifications: alignment.magnifications,
            combined,
            micro: None,
        };
        Ok(SeriesCandidate { model: best, fit })
    }

    /// Microlensing of the combined light curve around the reference peak
    fn microlensing(
        &self,
        model: &M,
        fit: &SeriesFitResult,
    ) -> Result<Option<MicrolensingSummary>, FitError> {
        let Some(micro) = &self.config.microlensing else {
            return Ok(None);
        };
        let config = self.config;
        let t_peak = fit.t_peaks[&fit.reference];
        let model = with_peak(model, t_peak, fit.a_peaks[&fit.reference])?;

        let names: Vec<String> = fit
            .result
            .vparam_names
            .iter()
            .filter(|name| model.param_index(name).is_some() && !config.ties.contains(name))
            .cloned()
            .collect();
        let delay_bounds = config.bounds.get(FitConfig::DELAY_BOUNDS);
        let bounds: ParameterBounds = names
            .iter()
            .filter(|name| *name != model.amplitude_name())
            .filter_map(|name| match delay_bounds {
                Some((lower, upper)) if name == model.t0_name() => {
                    Some((name.clone(), (lower + t_peak, upper + t_peak)))
                }
                _ => {
                    let q = fit.param_quantiles.get(name)?;
                    Some((name.clone(), (q.lower, q.upper)))
                }
            })
            .collect();

        let summary = MicrolensingEstimator::new(micro.clone()).estimate(
            &model,
            &fit.combined.table,
            &names,
            &bounds,
            &config.sampler,
        )?;
        info!(micro = summary.micro, n_failed = summary.n_failed, "series microlensing");
        Ok(Some(summary))
    }
}
