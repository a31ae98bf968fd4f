//! Time delay fitting strategies
//!
//! Three strategies measure the delays and magnifications of the images relative to the
//! reference image:
//! - [ParallelFitter] fits every image on its own, the first fitted image gives the prior of the
//!   shared parameters for the others
//! - [SeriesFitter] fits all images at once with a time and a flux offset per image
//! - [ColorFitter] fits the color curve of two bands with a time offset per image
//!
//! Every strategy accepts several candidate models and keeps the one of the highest evidence.

mod band_selection;
pub use band_selection::select_bands;

mod batch;
pub use batch::{BatchItem, fit_batch, partition, reassemble};

mod color;
pub use color::ColorFitter;

mod guess;
pub use guess::{PeakGuess, guess_t0_and_amplitude};

mod parallel;
pub use parallel::ParallelFitter;

mod results;
pub use results::{
    BandPairEvidence, BandSelection, ColorFitResult, ImageFit, ParallelFitResult, SeriesFitResult,
};

mod series;
pub use series::SeriesFitter;

use crate::data::{LightCurveTable, MultiImageLightCurve};
use crate::error::{ConfigurationError, DataError, FitError};
use crate::micro::MicrolensingConfig;
use crate::model::{ParamMap, PhotometricModel, with_constants};
use crate::nest::{
    ChiSquare, FitResult, NestedSampler, ParameterBounds, ParameterSpace, SamplerConfig, Ties,
};
use crate::prior::{LnPrior1D, PriorSource};
use crate::quantile::Quantiles;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum FitMethod {
    Parallel,
    Series,
    Color,
}

/// Settings shared by all fitting strategies
///
/// `bounds` hold the prior ranges of model parameters. The `t0` range is relative to the guessed
/// time of peak of every image, the amplitude range is in units of the guessed amplitude unless
/// `guess_amplitude` is off. The special keys
/// [FitConfig::DELAY_BOUNDS] and [FitConfig::MAGNIFICATION_BOUNDS] give the ranges of the
/// per-image time and flux offsets when there is no prior stage to derive them from.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct FitConfig {
    /// Sampled model parameters, all parameters but the constants if empty
    pub params: Vec<String>,
    pub bounds: ParameterBounds,
    /// Prior densities of bounded parameters, uniform if absent
    pub priors: BTreeMap<String, LnPrior1D>,
    #[serde(skip)]
    pub ties: Ties,
    /// Model parameters fixed for every light curve, overridden by the light curve constants
    pub constants: BTreeMap<String, f64>,
    pub sampler: SamplerConfig,
    /// Bands to use, all bands if `None`
    pub bands: Option<BTreeSet<String>>,
    /// Bands with fewer observations in any image are dropped
    pub min_points_per_band: usize,
    /// Image order of [ParallelFitter], descending signal-to-noise if `None`
    pub fit_order: Option<Vec<String>>,
    /// Reference image, the light curve's own reference if `None`
    pub reference: Option<String>,
    /// Observer-frame peak time per image, replaces the guess
    pub t0_guess: Option<BTreeMap<String, f64>>,
    /// Scale the amplitude range by the peak guess, `[0.1, 10]` if `bounds` have none
    pub guess_amplitude: bool,
    /// Signal-to-noise threshold of observations used by the peak guess
    pub min_snr: f64,
    /// Rest-frame phase interval of the data to fit
    pub cut_time: Option<(f64, f64)>,
    /// Bands of [ColorFitter], the two of the highest signal-to-noise if `None`
    pub color_bands: Option<(String, String)>,
    /// Largest time difference of two observations making a color point
    pub color_match_tolerance: f64,
    /// Add the model flux covariance to the observation errors
    pub model_covariance: bool,
    pub microlensing: Option<MicrolensingConfig>,
    /// Run [select_bands] before the other stages of [fit_methods]
    pub select_bands: bool,
    /// Live points of every band pair fit of [select_bands]
    pub band_selection_npoints: usize,
}

impl FitConfig {
    pub const DELAY_BOUNDS: &'static str = "td";
    pub const MAGNIFICATION_BOUNDS: &'static str = "mu";

    pub fn new(params: Vec<String>, bounds: ParameterBounds) -> Self {
        Self {
            params,
            bounds,
            priors: BTreeMap::new(),
            ties: Ties::new(),
            constants: BTreeMap::new(),
            sampler: SamplerConfig::default(),
            bands: None,
            min_points_per_band: Self::default_min_points_per_band(),
            fit_order: None,
            reference: None,
            t0_guess: None,
            guess_amplitude: true,
            min_snr: Self::default_min_snr(),
            cut_time: None,
            color_bands: None,
            color_match_tolerance: Self::default_color_match_tolerance(),
            model_covariance: false,
            microlensing: None,
            select_bands: false,
            band_selection_npoints: Self::default_band_selection_npoints(),
        }
    }

    #[inline]
    pub fn default_min_points_per_band() -> usize {
        3
    }

    #[inline]
    pub fn default_min_snr() -> f64 {
        5.0
    }

    #[inline]
    pub fn default_color_match_tolerance() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_band_selection_npoints() -> usize {
        200
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_microlensing(mut self, microlensing: Option<MicrolensingConfig>) -> Self {
        self.microlensing = microlensing;
        self
    }

    /// Prior of a model parameter from `bounds` and `priors`, `range` overrides the bounds
    fn source(&self, name: &str, range: Option<(f64, f64)>) -> Option<PriorSource> {
        let (lower, upper) = range.or_else(|| self.bounds.get(name))?;
        Some(match self.priors.get(name) {
            Some(ln_prior) => PriorSource::Density {
                lower,
                upper,
                ln_prior: ln_prior.clone(),
            },
            None => PriorSource::flat(lower, upper),
        })
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self::new(vec![], ParameterBounds::new())
    }
}

/// Fit `curves` with one strategy and attach the result to a copy of it
///
/// `prior` is an earlier [ParallelFitter] result of the same light curves, it narrows the ranges
/// of [SeriesFitter] and [ColorFitter] and is ignored by [ParallelFitter].
pub fn fit<M: PhotometricModel>(
    curves: &MultiImageLightCurve,
    models: &[M],
    config: &FitConfig,
    method: FitMethod,
    prior: Option<&ParallelFitResult>,
) -> Result<MultiImageLightCurve, FitError> {
    let mut curves = with_reference(curves, config)?;
    match method {
        FitMethod::Parallel => {
            curves.parallel = Some(ParallelFitter::new(models, config).fit(&curves)?);
        }
        FitMethod::Series => {
            curves.series = Some(SeriesFitter::new(models, config).fit(&curves, prior)?);
        }
        FitMethod::Color => {
            curves.color = Some(ColorFitter::new(models, config).fit(&curves, prior)?);
        }
    }
    Ok(curves)
}

/// Run several strategies in the order parallel, series, color
///
/// With `chain_prior` the parallel result is the prior of the later stages. With
/// [FitConfig::select_bands] the band selection runs first: the color stage uses the best pair
/// and the other stages the safe bands.
pub fn fit_methods<M: PhotometricModel>(
    curves: &MultiImageLightCurve,
    models: &[M],
    config: &FitConfig,
    methods: &[FitMethod],
    chain_prior: bool,
) -> Result<MultiImageLightCurve, FitError> {
    let methods: BTreeSet<FitMethod> = methods.iter().copied().collect();
    let mut curves = with_reference(curves, config)?;
    let mut config = config.clone();
    let mut color_config = config.clone();

    if config.select_bands {
        let selection = select_bands(&curves, models, &config)?;
        info!(
            color_bands = ?selection.color_bands,
            safe_bands = ?selection.safe_bands,
            "bands selected"
        );
        config.bands = Some(selection.safe_bands.clone());
        color_config.color_bands = Some(selection.color_bands.clone());
        curves.band_selection = Some(selection);
    }

    for method in methods {
        let prior = if chain_prior {
            curves.parallel.clone()
        } else {
            None
        };
        let config = match method {
            FitMethod::Color => &color_config,
            _ => &config,
        };
        curves = fit(&curves, models, config, method, prior.as_ref())?;
    }
    Ok(curves)
}

fn with_reference(
    curves: &MultiImageLightCurve,
    config: &FitConfig,
) -> Result<MultiImageLightCurve, FitError> {
    let curves = curves.clone();
    Ok(match &config.reference {
        Some(reference) => curves.with_reference(reference)?,
        None => curves,
    })
}

/// Light curves restricted to the bands having enough points in every image
fn usable_bands(
    curves: &MultiImageLightCurve,
    config: &FitConfig,
) -> Result<MultiImageLightCurve, FitError> {
    let mut bands = curves.common_bands(config.min_points_per_band);
    if let Some(selected) = &config.bands {
        bands.retain(|band| selected.contains(band));
    }
    if bands.is_empty() {
        let error = sparse_band(curves, config).unwrap_or(DataError::NoValidCandidates("bands"));
        return Err(error.into());
    }
    debug!(?bands, "bands to fit");
    Ok(curves.restricted_to(&bands)?)
}

/// First selected band having too few observations in some image
fn sparse_band(curves: &MultiImageLightCurve, config: &FitConfig) -> Option<DataError> {
    let minimum = config.min_points_per_band;
    curves
        .bands()
        .into_iter()
        .filter(|band| config.bands.as_ref().is_none_or(|selected| selected.contains(band)))
        .find_map(|band| {
            curves.images.iter().find_map(|(image, table)| {
                let actual = table.band_count(&band);
                (actual < minimum).then(|| DataError::InsufficientPoints {
                    image: image.clone(),
                    band: band.clone(),
                    actual,
                    minimum,
                })
            })
        })
}

/// Model candidate with the configuration and light curve constants applied
fn configured_model<M: PhotometricModel>(
    model: &M,
    curves: &MultiImageLightCurve,
    config: &FitConfig,
) -> Result<M, FitError> {
    let model = with_constants(model, &config.constants)?;
    Ok(with_constants(&model, &curves.constants)?)
}

/// Sampled model parameters, checked against the model
fn vparam_names<M: PhotometricModel>(
    model: &M,
    curves: &MultiImageLightCurve,
    config: &FitConfig,
) -> Result<Vec<String>, FitError> {
    if config.params.is_empty() {
        return Ok(model
            .param_names()
            .iter()
            .filter(|name| {
                !config.constants.contains_key(*name) && !curves.constants.contains_key(*name)
            })
            .cloned()
            .collect());
    }
    for name in &config.params {
        if model.param_index(name).is_none() {
            return Err(ConfigurationError::UnknownParameter {
                param: name.clone(),
            }
            .into());
        }
    }
    Ok(config.params.clone())
}

/// Peak guess of one image, the configured peak time takes precedence
fn peak_guess<M: PhotometricModel>(
    model: &M,
    table: &LightCurveTable,
    image: &str,
    config: &FitConfig,
) -> Result<PeakGuess, FitError> {
    let mut guess = guess_t0_and_amplitude(model, table, config.min_snr)?;
    if let Some(t0) = config.t0_guess.as_ref().and_then(|t0s| t0s.get(image)) {
        guess.t0 = *t0;
    }
    debug!(image, t0 = guess.t0, amplitude = guess.amplitude, "peak guess");
    Ok(guess)
}

/// Prior sources of the model parameters when no earlier stage constrains them
fn guessed_sources<M: PhotometricModel>(
    model: &M,
    names: &[String],
    config: &FitConfig,
    guess: PeakGuess,
) -> BTreeMap<String, PriorSource> {
    names
        .iter()
        .filter_map(|name| {
            let range = if name == model.t0_name() {
                config
                    .bounds
                    .get(name)
                    .map(|(lower, upper)| (lower + guess.t0, upper + guess.t0))
            } else if name == model.amplitude_name() && config.guess_amplitude {
                let (lower, upper) = config.bounds.get(name).unwrap_or((0.1, 10.0));
                Some((lower * guess.amplitude, upper * guess.amplitude))
            } else {
                None
            };
            config.source(name, range).map(|source| (name.clone(), source))
        })
        .collect()
}

/// Rest-frame phase cut around `t_ref`
fn cut_range<M: PhotometricModel>(model: &M, config: &FitConfig, t_ref: f64) -> Option<(f64, f64)> {
    let z = model.redshift(model.parameters());
    config
        .cut_time
        .map(|(lower, upper)| (lower * (1.0 + z) + t_ref, upper * (1.0 + z) + t_ref))
}

/// Shifts moving every image to the reference frame before a joint fit, and the peak of the
/// reference image
#[derive(Clone, Debug)]
struct Alignment {
    delays: BTreeMap<String, f64>,
    magnifications: BTreeMap<String, f64>,
    t0: f64,
    amplitude: f64,
}

impl Alignment {
    /// Medians of the prior stage, or peak guesses of every image
    fn new<M: PhotometricModel>(
        curves: &MultiImageLightCurve,
        model: &M,
        config: &FitConfig,
        prior: Option<&ParallelFitResult>,
    ) -> Result<Self, FitError> {
        let reference = curves.reference.as_str();
        match prior {
            Some(prior) => {
                let reference_fit = prior.images.get(reference).ok_or_else(|| {
                    ConfigurationError::UnknownImage {
                        image: reference.to_owned(),
                    }
                })?;
                let param = |name: &str| {
                    reference_fit.model.get(name).ok_or_else(|| {
                        ConfigurationError::UnknownParameter {
                            param: name.to_owned(),
                        }
                    })
                };
                let delay = |image: &str| prior.time_delays.get(image).map(|q| q.median);
                let magnification =
                    |image: &str| prior.magnifications.get(image).map(|q| q.median);
                let delay_ref = delay(reference).unwrap_or(0.0);
                let magnification_ref = magnification(reference).unwrap_or(1.0);
                Ok(Self {
                    delays: curves
                        .image_names()
                        .filter_map(|image| Some((image.to_owned(), delay(image)? - delay_ref)))
                        .collect(),
                    magnifications: curves
                        .image_names()
                        .filter_map(|image| {
                            Some((image.to_owned(), magnification(image)? / magnification_ref))
                        })
                        .collect(),
                    t0: param(model.t0_name())?,
                    amplitude: param(model.amplitude_name())?,
                })
            }
            None => {
                let guesses = curves
                    .images
                    .iter()
                    .map(|(image, table)| {
                        Ok((image.as_str(), peak_guess(model, table, image, config)?))
                    })
                    .collect::<Result<BTreeMap<_, _>, FitError>>()?;
                let reference_guess = guesses[reference];
                Ok(Self {
                    delays: guesses
                        .iter()
                        .map(|(&image, guess)| (image.to_owned(), guess.t0 - reference_guess.t0))
                        .collect(),
                    magnifications: guesses
                        .iter()
                        .map(|(&image, guess)| {
                            (image.to_owned(), guess.amplitude / reference_guess.amplitude)
                        })
                        .collect(),
                    t0: reference_guess.t0,
                    amplitude: reference_guess.amplitude,
                })
            }
        }
    }

    fn delay(&self, image: &str) -> f64 {
        self.delays.get(image).copied().unwrap_or(0.0)
    }

    fn magnification(&self, image: &str) -> f64 {
        self.magnifications.get(image).copied().unwrap_or(1.0)
    }

    fn peak(&self) -> PeakGuess {
        PeakGuess {
            t0: self.t0,
            amplitude: self.amplitude,
        }
    }
}

/// Prior range of the time offset of a non-reference image
fn delay_range(
    image: &str,
    config: &FitConfig,
    prior: Option<&ParallelFitResult>,
) -> Option<(f64, f64)> {
    match prior.and_then(|prior| prior.time_delays.get(image)) {
        Some(q) => Some(q.shifted(-q.median).widened(3.0)),
        None => config.bounds.get(FitConfig::DELAY_BOUNDS),
    }
}

/// Prior range of the flux scale of a non-reference image
fn magnification_range(
    image: &str,
    config: &FitConfig,
    prior: Option<&ParallelFitResult>,
) -> Option<(f64, f64)> {
    match prior.and_then(|prior| prior.magnifications.get(image)) {
        Some(q) if q.median > 0.0 => Some(q.scaled(q.median.recip()).widened(3.0)),
        _ => config.bounds.get(FitConfig::MAGNIFICATION_BOUNDS),
    }
}

/// Prior sources of the model parameters of a joint fit
///
/// With a prior stage the ranges are three times the 1-sigma intervals of the reference image
/// posterior, otherwise they are derived from the configuration and the alignment peak.
fn joint_sources<M: PhotometricModel>(
    model: &M,
    names: &[String],
    config: &FitConfig,
    alignment: &Alignment,
    reference: &str,
    prior: Option<&ParallelFitResult>,
) -> BTreeMap<String, PriorSource> {
    let mut sources = guessed_sources(model, names, config, alignment.peak());
    if let Some(reference_fit) = prior.and_then(|prior| prior.images.get(reference)) {
        for name in names {
            if let Some(q) = reference_fit.param_quantiles.get(name) {
                let (lower, upper) = q.widened(3.0);
                if lower < upper {
                    sources.insert(name.clone(), PriorSource::flat(lower, upper));
                }
            }
        }
    }
    sources
}

/// Sample the posterior of a single light curve
fn fit_table<M: PhotometricModel>(
    model: &M,
    table: &LightCurveTable,
    space: &ParameterSpace,
    config: &FitConfig,
) -> Result<(M, FitResult), FitError> {
    let map = ParamMap::new(model, space.names());
    let chi2 = ChiSquare::new(model, table, config.model_covariance);
    let result =
        NestedSampler::new(config.sampler.clone()).run(space, |v| chi2.loglike(&map.full(v)))?;
    let model = best_model(model, &result)?;
    Ok((model, result))
}

/// Clone of `model` peaking at `t0` with `amplitude`
fn with_peak<M: PhotometricModel>(model: &M, t0: f64, amplitude: f64) -> Result<M, FitError> {
    let mut model = model.clone();
    let (t0_name, amplitude_name) = (
        model.t0_name().to_owned(),
        model.amplitude_name().to_owned(),
    );
    model.set(&t0_name, t0)?;
    model.set(&amplitude_name, amplitude)?;
    Ok(model)
}

/// Clone of `model` with the sampled model parameters at their posterior medians
fn best_model<M: PhotometricModel>(model: &M, result: &FitResult) -> Result<M, FitError> {
    let mut model = model.clone();
    for (name, &value) in result.vparam_names.iter().zip(result.best_fit.iter()) {
        if model.param_index(name).is_some() {
            model.set(name, value)?;
        }
    }
    Ok(model)
}

fn param_quantiles(result: &FitResult) -> Result<BTreeMap<String, Quantiles>, FitError> {
    result
        .vparam_names
        .iter()
        .zip(result.samples.columns())
        .map(|(name, column)| {
            Ok((
                name.clone(),
                Quantiles::from_weighted(column, result.weights.view())?,
            ))
        })
        .collect()
}

/// Fit every model candidate and keep the one of the highest evidence
///
/// Candidates failing with a data or numerical error are skipped.
fn best_candidate<M, T>(
    models: &[M],
    stage: &'static str,
    fit: impl Fn(&M) -> Result<T, FitError>,
    logz: impl Fn(&T) -> f64,
) -> Result<T, FitError>
where
    M: PhotometricModel,
{
    if models.is_empty() {
        return Err(ConfigurationError::NoModels.into());
    }
    let mut best: Option<T> = None;
    for model in models {
        match fit(model) {
            Ok(candidate) => {
                debug!(stage, model = model.name(), logz = logz(&candidate), "candidate fitted");
                if best.as_ref().is_none_or(|b| logz(&candidate) > logz(b)) {
                    best = Some(candidate);
                }
            }
            Err(error) if error.is_skippable() => {
                warn!(stage, model = model.name(), %error, "candidate model skipped");
            }
            Err(error) => return Err(error),
        }
    }
    best.ok_or_else(|| DataError::NoValidCandidates("models").into())
}

/// Name of the time offset of an image
fn delay_param(image: &str) -> String {
    format!("t_{image}")
}

/// Name of the flux scale of an image
fn magnification_param(image: &str) -> String {
    format!("a_{image}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BazinModel;
    use crate::tests::*;

    #[test]
    fn default_params_skip_constants() {
        let (curves, _) = lensed_pair(0, &["r"], 0.0, 1.0);
        let config = FitConfig::default().with_constant("z", 0.0);
        let names = vparam_names(&BazinModel::default(), &curves, &config).unwrap();
        assert_eq!(names, ["t0", "amplitude", "rise", "fall"]);
    }

    #[test]
    fn unknown_param() {
        let (curves, _) = lensed_pair(0, &["r"], 0.0, 1.0);
        let config = FitConfig::new(vec!["x1".to_owned()], ParameterBounds::new());
        assert_eq!(
            vparam_names(&BazinModel::default(), &curves, &config),
            Err(FitError::Configuration(ConfigurationError::UnknownParameter {
                param: "x1".to_owned()
            }))
        );
    }

    #[test]
    fn guessed_sources_are_relative_to_peak() {
        let model = BazinModel::default();
        let names: Vec<String> = ["t0", "amplitude", "rise", "fall"]
            .iter()
            .map(|&s| s.to_owned())
            .collect();
        let mut config = FitConfig::new(
            names.clone(),
            ParameterBounds::new()
                .with("t0", -5.0, 5.0)
                .with("rise", 1.0, 10.0),
        );
        config.priors.insert("rise".to_owned(), LnPrior1D::normal(3.0, 1.0));
        let guess = PeakGuess {
            t0: 100.0,
            amplitude: 20.0,
        };
        let sources = guessed_sources(&model, &names, &config, guess);
        assert_eq!(sources["t0"], PriorSource::flat(95.0, 105.0));
        assert_eq!(sources["amplitude"], PriorSource::flat(2.0, 200.0));
        assert!(matches!(sources["rise"], PriorSource::Density { .. }));
        assert!(!sources.contains_key("fall"));

        config.bounds.insert("amplitude", 0.5, 2.0);
        let sources = guessed_sources(&model, &names, &config, guess);
        assert_eq!(sources["amplitude"], PriorSource::flat(10.0, 40.0));

        config.guess_amplitude = false;
        let sources = guessed_sources(&model, &names, &config, guess);
        assert_eq!(sources["amplitude"], PriorSource::flat(0.5, 2.0));
    }

    #[test]
    fn missing_prior_is_configuration_error() {
        let (curves, _) = lensed_pair(1, &["r"], 10.0, 2.0);
        let config = FitConfig::new(
            vec!["t0".to_owned(), "amplitude".to_owned(), "rise".to_owned()],
            ParameterBounds::new().with("t0", -10.0, 10.0),
        )
        .with_constant("z", 0.0);
        let error = fit(
            &curves,
            &[BazinModel::default()],
            &config,
            FitMethod::Parallel,
            None,
        )
        .unwrap_err();
        assert_eq!(
            error,
            FitError::Configuration(ConfigurationError::MissingPrior {
                param: "rise".to_owned()
            })
        );
    }

    #[test]
    fn no_models() {
        let (curves, _) = lensed_pair(2, &["r"], 10.0, 2.0);
        let error = fit::<BazinModel>(
            &curves,
            &[],
            &FitConfig::default(),
            FitMethod::Series,
            None,
        )
        .unwrap_err();
        assert_eq!(error, FitError::Configuration(ConfigurationError::NoModels));
    }

    #[test]
    fn unknown_reference() {
        let (curves, _) = lensed_pair(3, &["r"], 10.0, 2.0);
        let config = FitConfig {
            reference: Some("image_9".to_owned()),
            ..FitConfig::default()
        };
        assert!(matches!(
            fit(&curves, &[BazinModel::default()], &config, FitMethod::Parallel, None),
            Err(FitError::Configuration(ConfigurationError::UnknownImage { .. }))
        ));
    }

    #[test]
    fn too_few_points_per_band() {
        let (curves, _) = lensed_pair(4, &["r"], 10.0, 2.0);
        let config = FitConfig {
            min_points_per_band: 100_000,
            ..FitConfig::default()
        };
        let actual = curves.images["image_1"].band_count("r");
        assert_eq!(
            usable_bands(&curves, &config).unwrap_err(),
            FitError::Data(DataError::InsufficientPoints {
                image: "image_1".to_owned(),
                band: "r".to_owned(),
                actual,
                minimum: 100_000,
            })
        );
    }

    #[test]
    fn selected_band_is_missing() {
        let (curves, _) = lensed_pair(4, &["r"], 10.0, 2.0);
        let config = FitConfig {
            bands: Some(BTreeSet::from(["i".to_owned()])),
            ..FitConfig::default()
        };
        assert_eq!(
            usable_bands(&curves, &config).unwrap_err(),
            FitError::Data(DataError::NoValidCandidates("bands"))
        );
    }
}
