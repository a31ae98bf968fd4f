use crate::data::{ColorTable, MultiImageLightCurve};
use crate::error::{ConfigurationError, DataError, FitError};
use crate::fit::{
    Alignment, ColorFitResult, FitConfig, ParallelFitResult, best_candidate, best_model,
    configured_model, cut_range, delay_param, delay_range, joint_sources, param_quantiles,
    usable_bands, vparam_names, with_peak,
};
use crate::model::{ParamMap, PhotometricModel};
use crate::nest::{NestedSampler, ParameterSpace, color_loglike};
use crate::prior::PriorSource;

use std::collections::BTreeMap;
use tracing::{debug, info};

/// Joint fit of the color curve of all images
///
/// The color of two bands doesn't depend on the amplitude or on an achromatic magnification, so
/// the only nuisance parameter is a time offset `t_<image>` per image relative to the initial
/// alignment. The pair of bands is [FitConfig::color_bands] or the two bands of the highest
/// signal-to-noise.
#[derive(Clone, Debug)]
pub struct ColorFitter<'a, M> {
    models: &'a [M],
    config: &'a FitConfig,
}

impl<'a, M: PhotometricModel> ColorFitter<'a, M> {
    pub fn new(models: &'a [M], config: &'a FitConfig) -> Self {
        Self { models, config }
    }

    pub fn fit(
        &self,
        curves: &MultiImageLightCurve,
        prior: Option<&ParallelFitResult>,
    ) -> Result<ColorFitResult, FitError> {
        let curves = usable_bands(curves, self.config)?;
        let bands = self.bands(&curves)?;
        info!(
            n_images = curves.n_images(),
            reference = %curves.reference,
            ?bands,
            with_prior = prior.is_some(),
            "color fit started"
        );
        let fit = best_candidate(
            self.models,
            "color",
            |model| self.fit_model(&curves, (&bands.0, &bands.1), model, prior),
            |fit| fit.result.logz,
        )?;
        for (image, delay) in &fit.time_delays {
            info!(image = %image, delay = delay.median, "color estimate");
        }
        Ok(fit)
    }

    fn bands(&self, curves: &MultiImageLightCurve) -> Result<(String, String), FitError> {
        match &self.config.color_bands {
            Some((first, second)) => {
                let available = curves.bands();
                let actual = [first, second]
                    .into_iter()
                    .filter(|band| available.contains(*band))
                    .count();
                if first == second || actual < 2 {
                    return Err(ConfigurationError::TooFewBands { actual }.into());
                }
                Ok((first.clone(), second.clone()))
            }
            None => Ok(curves.best_band_pair()?),
        }
    }

    fn fit_model(
        &self,
        curves: &MultiImageLightCurve,
        bands: (&str, &str),
        model: &M,
        prior: Option<&ParallelFitResult>,
    ) -> Result<ColorFitResult, FitError> {
        let config = self.config;
        let reference = curves.reference.as_str();
        let model = configured_model(model, curves, config)?;
        let alignment = Alignment::new(curves, &model, config, prior)?;
        let model = with_peak(&model, alignment.t0, alignment.amplitude)?;
        debug!(delays = ?alignment.delays, "initial alignment");

        let tolerance = config.color_match_tolerance;
        let colors = ColorTable::new(curves, bands, &alignment.delays, tolerance);
        let colors = match cut_range(&model, config, alignment.t0) {
            Some((lower, upper)) => colors.within_time(lower, upper),
            None => colors,
        };
        if colors.is_empty() {
            return Err(DataError::NoPositiveFlux("color curve").into());
        }
        debug!(n_points = colors.len(), "color curve built");

        let mut names: Vec<String> = vparam_names(&model, curves, config)?
            .into_iter()
            .filter(|name| name != model.amplitude_name())
            .collect();
        let mut sources = joint_sources(&model, &names, config, &alignment, reference, prior);
        let mut ties = config.ties.clone();
        for image in curves.image_names() {
            let t_name = delay_param(image);
            if image == reference {
                ties = ties.with(t_name.clone(), |_| 0.0);
            } else if let Some((lower, upper)) = delay_range(image, config, prior) {
                sources.insert(t_name.clone(), PriorSource::flat(lower, upper));
            }
            names.push(t_name);
        }
        let space = ParameterSpace::from_sources(&names, &sources, &ties)?;
        let t_index = colors
            .image_names
            .iter()
            .map(|image| {
                let name = delay_param(image);
                space
                    .index_of(&name)
                    .ok_or(ConfigurationError::MissingPrior { param: name })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let map = ParamMap::new(&model, space.names());
        let result = NestedSampler::new(config.sampler.clone()).run(&space, |v| {
            color_loglike(&model, &map.full(v), &colors, |image| v[t_index[image]])
        })?;

        let best = best_model(&model, &result)?;
        let param_quantiles = param_quantiles(&result)?;
        let t0 = best
            .get(best.t0_name())
            .ok_or_else(|| ConfigurationError::UnknownParameter {
                param: best.t0_name().to_owned(),
            })?;

        let mut time_delays = BTreeMap::new();
        let mut t_peaks = BTreeMap::new();
        for image in curves.image_names() {
            let name = delay_param(image);
            let t_offset = param_quantiles
                .get(&name)
                .copied()
                .ok_or(ConfigurationError::UnknownParameter { param: name })?;
            let delay0 = alignment.delay(image);
            time_delays.insert(image.to_owned(), t_offset.shifted(delay0));
            t_peaks.insert(image.to_owned(), t0 + delay0 + t_offset.median);
        }
        let median_delays = time_delays
            .iter()
            .map(|(image, q)| (image.clone(), q.median))
            .collect();
        let colors = ColorTable::new(curves, bands, &median_delays, tolerance);

        Ok(ColorFitResult {
            reference: reference.to_owned(),
            bands: (bands.0.to_owned(), bands.1.to_owned()),
            model: best.state(),
            result,
            param_quantiles,
            time_delays,
            t_peaks,
            initial_delays: alignment.delays,
            colors,
        })
    }
}
