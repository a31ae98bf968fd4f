#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

pub mod data;
pub use data::{ColorTable, CombinedLightCurve, LightCurveTable, MultiImageLightCurve, Observation};

mod error;
pub use error::{ConfigurationError, DataError, FitError, FitFailure, NumericalError};

pub mod fit;
pub use fit::{
    BandPairEvidence, BandSelection, BatchItem, ColorFitResult, ColorFitter, FitConfig, FitMethod,
    ImageFit, ParallelFitResult, ParallelFitter, PeakGuess, SeriesFitResult, SeriesFitter, fit,
    fit_batch, fit_methods, guess_t0_and_amplitude, partition, reassemble, select_bands,
};

pub mod micro;
pub use micro::{
    MicrolensingConfig, MicrolensingEstimator, MicrolensingMode, MicrolensingSummary, RbfKernel,
};

pub mod model;
pub use model::{BandShape, BazinModel, ModelState, PhotometricModel};

pub mod nest;
pub use nest::{FitResult, NestedSampler, ParameterBounds, SamplerConfig, SamplerMethod, Ties};

pub mod prior;
pub use prior::{LnPrior1D, PriorSource};

mod quantile;
pub use quantile::{QuantileError, Quantiles, weighted_quantile};

pub use ndarray;
