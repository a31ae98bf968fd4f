//! Photometric models of the transient
//!
//! The physics of the source lives outside of this crate. The fitting engine talks to a model
//! through [`PhotometricModel`] only: every evaluation receives an explicit parameter vector, so
//! a model is never mutated while a likelihood is being evaluated. The model's own parameter
//! vector holds the configured state (constants, best-fit values) and is only written between
//! fits, on a private clone.

mod bazin;
pub use bazin::{BandShape, BazinModel};

mod microlensing;
pub use microlensing::{AchromaticMicrolensing, Microlensed};

use crate::data::LightCurveTable;
use crate::error::ConfigurationError;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub trait PhotometricModel: Clone + Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Ordered names of all model parameters
    fn param_names(&self) -> &[String];

    /// Current parameter values, in [`PhotometricModel::param_names`] order
    fn parameters(&self) -> &[f64];

    fn parameters_mut(&mut self) -> &mut [f64];

    /// Name of the overall flux scale parameter
    fn amplitude_name(&self) -> &str;

    /// Name of the time-of-peak parameter
    fn t0_name(&self) -> &str {
        "t0"
    }

    /// Observer-frame flux in `band` at `time` for the zero point `zp`
    fn bandflux(&self, params: &[f64], band: &str, time: f64, zp: f64, zpsys: &str) -> f64;

    /// Observer-frame time interval where the model is defined
    fn time_domain(&self, params: &[f64]) -> (f64, f64);

    /// Model flux covariance for the observations, `None` if the model doesn't provide one
    fn bandflux_covariance(&self, _params: &[f64], _data: &LightCurveTable) -> Option<Array2<f64>> {
        None
    }

    fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names().iter().position(|p| p == name)
    }

    fn get(&self, name: &str) -> Option<f64> {
        self.param_index(name).map(|i| self.parameters()[i])
    }

    fn set(&mut self, name: &str, value: f64) -> Result<(), ConfigurationError> {
        let i = self
            .param_index(name)
            .ok_or_else(|| ConfigurationError::UnknownParameter {
                param: name.to_owned(),
            })?;
        self.parameters_mut()[i] = value;
        Ok(())
    }

    fn redshift(&self, params: &[f64]) -> f64 {
        self.param_index("z").map_or(0.0, |i| params[i])
    }

    fn bandmag(&self, params: &[f64], band: &str, time: f64, zpsys: &str) -> f64 {
        const ZP: f64 = 25.0;
        -2.5 * f64::log10(self.bandflux(params, band, time, ZP, zpsys)) + ZP
    }

    /// Magnitude difference between two bands at the same time
    fn color(&self, params: &[f64], bands: (&str, &str), time: f64, zpsys: &str) -> f64 {
        self.bandmag(params, bands.0, time, zpsys) - self.bandmag(params, bands.1, time, zpsys)
    }

    /// Snapshot of the current parameters
    fn state(&self) -> ModelState {
        ModelState {
            model_name: self.name().to_owned(),
            param_names: self.param_names().to_vec(),
            parameters: self.parameters().to_vec(),
        }
    }
}

/// Named parameter values of a model, e.g. the best fit of a stage
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelState {
    pub model_name: String,
    pub param_names: Vec<String>,
    pub parameters: Vec<f64>,
}

impl ModelState {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.param_names
            .iter()
            .position(|p| p == name)
            .map(|i| self.parameters[i])
    }

    /// Copy the values into a model with the same parameter names
    pub fn apply_to<M: PhotometricModel>(&self, model: &mut M) -> Result<(), ConfigurationError> {
        for (name, &value) in self.param_names.iter().zip(self.parameters.iter()) {
            model.set(name, value)?;
        }
        Ok(())
    }
}

/// Clone of `model` with `constants` applied
pub(crate) fn with_constants<'a, M: PhotometricModel>(
    model: &M,
    constants: impl IntoIterator<Item = (&'a String, &'a f64)>,
) -> Result<M, ConfigurationError> {
    let mut model = model.clone();
    for (name, &value) in constants {
        model.set(name, value)?;
    }
    Ok(model)
}

/// Scatter of a sampled vector into the full parameter vector of a model
///
/// Sampled names that are not model parameters, e.g. per-image nuisance offsets, are skipped.
#[derive(Clone, Debug)]
pub(crate) struct ParamMap {
    base: Vec<f64>,
    index: Vec<(usize, usize)>,
}

impl ParamMap {
    pub(crate) fn new<M: PhotometricModel>(model: &M, vparam_names: &[String]) -> Self {
        let index = vparam_names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| model.param_index(name).map(|j| (i, j)))
            .collect();
        Self {
            base: model.parameters().to_vec(),
            index,
        }
    }

    pub(crate) fn full(&self, v: &[f64]) -> Vec<f64> {
        let mut params = self.base.clone();
        for &(i, j) in &self.index {
            params[j] = v[i];
        }
        params
    }
}
