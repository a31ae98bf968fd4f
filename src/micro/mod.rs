//! Systematic uncertainty of the time of peak caused by microlensing
//!
//! Microlensing is not part of the light curve model, so its impact is estimated by resampling:
//! the data-to-model flux ratio is described by a Gaussian process, curves drawn from its
//! posterior are put back into the model as an achromatic magnification, and the light curve is
//! refitted for every draw. The spread of the recovered peak times is the systematic term.

mod gp;
pub use gp::{GaussianProcess, RbfKernel};

use crate::data::LightCurveTable;
use crate::error::{ConfigurationError, DataError, FitError};
use crate::model::{AchromaticMicrolensing, Microlensed, ParamMap, PhotometricModel};
use crate::nest::{ChiSquare, NestedSampler, ParameterBounds, ParameterSpace, SamplerConfig, Ties};
use crate::prior::PriorSource;

use ndarray::Array1;
use rand::prelude::*;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum MicrolensingMode {
    /// Same magnification in every band
    #[default]
    Achromatic,
    /// Band-dependent magnification, not supported
    Chromatic,
}

impl fmt::Display for MicrolensingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Achromatic => write!(f, "achromatic"),
            Self::Chromatic => write!(f, "chromatic"),
        }
    }
}

/// Settings of [MicrolensingEstimator]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MicrolensingConfig {
    pub mode: MicrolensingMode,
    /// Number of Gaussian process draws, each one is refitted
    pub n_samples: usize,
    /// Rest-frame phase interval of the residuals
    pub window: (f64, f64),
    /// Number of nodes of the drawn magnification curves
    pub grid_size: usize,
    pub kernel: RbfKernel,
    /// Live points of every refit
    pub refit_npoints: usize,
    pub maxcall: Option<usize>,
    /// Seed of the Gaussian process draws, refit `i` is seeded with `seed + i + 1` modulo 2^64
    pub seed: Option<u64>,
}

impl MicrolensingConfig {
    pub fn new(mode: MicrolensingMode, n_samples: usize) -> Self {
        Self {
            mode,
            n_samples,
            window: Self::default_window(),
            grid_size: Self::default_grid_size(),
            kernel: RbfKernel::default(),
            refit_npoints: Self::default_refit_npoints(),
            maxcall: None,
            seed: None,
        }
    }

    #[inline]
    pub fn default_n_samples() -> usize {
        100
    }

    #[inline]
    pub fn default_window() -> (f64, f64) {
        (-15.0, 40.0)
    }

    #[inline]
    pub fn default_grid_size() -> usize {
        1000
    }

    #[inline]
    pub fn default_refit_npoints() -> usize {
        200
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for MicrolensingConfig {
    fn default() -> Self {
        Self::new(MicrolensingMode::default(), Self::default_n_samples())
    }
}

/// Outcome of [MicrolensingEstimator::estimate]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MicrolensingSummary {
    /// Systematic uncertainty of the peak time, `sqrt((t0 - mu)^2 + 9 sigma^2)`
    pub micro: f64,
    /// Mean of the refitted peak times
    pub mu: f64,
    /// Standard deviation of the refitted peak times
    pub sigma: f64,
    /// Peak time of the model the residuals are computed against
    pub t0: f64,
    /// Refitted peak times of the successful draws
    pub t0s: Vec<f64>,
    pub n_failed: usize,
    /// Observer-frame time since peak of the prediction grid
    pub x_pred: Vec<f64>,
    /// Posterior mean of the flux ratio on the grid
    pub y_pred: Vec<f64>,
    pub sigma_pred: Vec<f64>,
}

/// Flux ratio of the data to the model
struct Residuals {
    x: Vec<f64>,
    y: Vec<f64>,
    noise: Vec<f64>,
}

/// Gaussian process resampling estimate of the microlensing systematic
#[derive(Clone, Debug, Default)]
pub struct MicrolensingEstimator {
    config: MicrolensingConfig,
}

impl MicrolensingEstimator {
    pub fn new(config: MicrolensingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MicrolensingConfig {
        &self.config
    }

    /// Estimate the systematic for a best-fit `model` of `data`
    ///
    /// Every draw refits `vparam_names` within `bounds`, the amplitude is always refitted within
    /// `(0, 10 A)` where `A` is its best-fit value. Draws that fail to fit are skipped, the call
    /// fails only if none succeeds.
    pub fn estimate<M: PhotometricModel>(
        &self,
        model: &M,
        data: &LightCurveTable,
        vparam_names: &[String],
        bounds: &ParameterBounds,
        sampler: &SamplerConfig,
    ) -> Result<MicrolensingSummary, FitError> {
        let config = &self.config;
        if config.mode != MicrolensingMode::Achromatic {
            return Err(ConfigurationError::UnsupportedMicrolensing(config.mode.to_string()).into());
        }
        if config.n_samples == 0 || config.grid_size < 2 {
            return Err(ConfigurationError::InvalidSamplerConfig(
                "microlensing needs at least one draw and two grid nodes",
            )
            .into());
        }
        let params = model.parameters();
        let t0 = model
            .get(model.t0_name())
            .ok_or_else(|| ConfigurationError::UnknownParameter {
                param: model.t0_name().to_owned(),
            })?;
        let amplitude =
            model
                .get(model.amplitude_name())
                .ok_or_else(|| ConfigurationError::UnknownParameter {
                    param: model.amplitude_name().to_owned(),
                })?;
        let z = model.redshift(params);

        let residuals = self.residuals(model, data, t0, z)?;
        let gp = GaussianProcess::fit(
            &residuals.x,
            &residuals.y,
            &residuals.noise,
            1.0,
            config.kernel,
        )?;
        debug!(
            length_scale = gp.length_scale(),
            signal_variance = gp.signal_variance(),
            n = residuals.x.len(),
            "microlensing residuals fitted"
        );

        let (x_min, x_max) = residuals
            .x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let x_pred = Array1::linspace(x_min, x_max, config.grid_size).to_vec();
        let (y_pred, sigma_pred) = gp.predict(&x_pred)?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let draws = gp.sample(&x_pred, config.n_samples, &mut rng)?;

        let mut sources: BTreeMap<String, PriorSource> = bounds
            .iter()
            .map(|(name, (lower, upper))| (name.to_owned(), PriorSource::flat(lower, upper)))
            .collect();
        sources.insert(
            model.amplitude_name().to_owned(),
            PriorSource::flat(0.0, 10.0 * amplitude),
        );
        let mut names = vparam_names.to_vec();
        if !names.iter().any(|name| name == model.amplitude_name()) {
            names.push(model.amplitude_name().to_owned());
        }
        let space = ParameterSpace::from_sources(&names, &sources, &Ties::new())?;
        let t0_index = space
            .index_of(model.t0_name())
            .ok_or_else(|| ConfigurationError::MissingPrior {
                param: model.t0_name().to_owned(),
            })?;
        let phase: Vec<f64> = x_pred.iter().map(|x| x / (1.0 + z)).collect();

        let outcomes: Vec<Result<f64, FitError>> = draws
            .into_par_iter()
            .enumerate()
            .map(|(i, magnification)| {
                // private clone per draw
                let lensed = Microlensed::new(
                    model.clone(),
                    AchromaticMicrolensing::new(phase.clone(), magnification),
                );
                let map = ParamMap::new(&lensed, space.names());
                let chi2 = ChiSquare::new(&lensed, data, false);
                let sampler = NestedSampler::new(
                    sampler
                        .clone()
                        .with_npoints(config.refit_npoints)
                        .with_maxcall(config.maxcall)
                        .with_seed(config.seed.map(|seed| refit_seed(seed, i))),
                );
                let result = sampler.run(&space, |v| chi2.loglike(&map.full(v)))?;
                Ok(result.best_fit[t0_index])
            })
            .collect();

        let mut t0s = Vec::with_capacity(outcomes.len());
        let mut n_failed = 0;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(t) => t0s.push(t),
                Err(error) => {
                    warn!(draw = i, %error, "microlensing refit failed, skipping");
                    n_failed += 1;
                }
            }
        }
        if t0s.is_empty() {
            return Err(DataError::NoValidCandidates("microlensing draws").into());
        }

        let (mu, sigma) = normal_fit(&t0s);
        let micro = f64::sqrt((t0 - mu).powi(2) + 9.0 * sigma.powi(2));
        info!(micro, mu, sigma, n_failed, "microlensing systematic estimated");
        Ok(MicrolensingSummary {
            micro,
            mu,
            sigma,
            t0,
            t0s,
            n_failed,
            x_pred,
            y_pred,
            sigma_pred,
        })
    }

    fn residuals<M: PhotometricModel>(
        &self,
        model: &M,
        data: &LightCurveTable,
        t0: f64,
        z: f64,
    ) -> Result<Residuals, FitError> {
        let (lower, upper) = self.config.window;
        let in_window: Vec<usize> = (0..data.len())
            .filter(|&i| (lower..=upper).contains(&((data.time[i] - t0) / (1.0 + z))))
            .collect();
        let rows = if in_window.is_empty() {
            debug!("no observations in the microlensing window, using all of them");
            (0..data.len()).collect()
        } else {
            in_window
        };

        let params = model.parameters();
        let mut residuals = Residuals {
            x: vec![],
            y: vec![],
            noise: vec![],
        };
        for i in rows {
            let model_flux =
                model.bandflux(params, &data.band[i], data.time[i], data.zp[i], &data.zpsys[i]);
            let flux = data.flux[i];
            if !(flux > 0.0 && model_flux > 0.0) {
                continue;
            }
            let ratio = flux / model_flux;
            let err = ratio * data.fluxerr[i] / flux;
            residuals.x.push(data.time[i] - t0);
            residuals.y.push(ratio);
            residuals.noise.push(err * err);
        }
        if residuals.x.is_empty() {
            return Err(DataError::NoPositiveFlux("microlensing residuals").into());
        }
        Ok(residuals)
    }
}

/// Maximum likelihood normal distribution parameters
fn normal_fit(x: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let variance = x.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn refit_seed(seed: u64, draw: usize) -> u64 {
    seed.wrapping_add(draw as u64).wrapping_add(1)
}
