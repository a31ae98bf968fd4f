use crate::quantile::QuantileError;

/// Error raised by an invalid fit configuration, fatal to the fit call
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("parameter {param} has neither bounds, a prior, nor a tie function")]
    MissingPrior { param: String },

    #[error("color fitting requires two bands, {actual} given")]
    TooFewBands { actual: usize },

    #[error("model has no parameter named {param}")]
    UnknownParameter { param: String },

    #[error("light curve has no image named {image}")]
    UnknownImage { image: String },

    #[error("invalid bounds for {param}: lower {lower} must be finite and below upper {upper}")]
    InvalidBounds { param: String, lower: f64, upper: f64 },

    #[error("at least one parameter must be sampled")]
    EmptyParameterSpace,

    #[error("invalid sampler configuration: {0}")]
    InvalidSamplerConfig(&'static str),

    #[error("{0} microlensing is not implemented")]
    UnsupportedMicrolensing(String),

    #[error("no candidate models were given")]
    NoModels,
}

/// Error caused by the data itself, the caller may skip the offending band, pair or model
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DataError {
    #[error("light curve table is empty")]
    EmptyTable,

    #[error("light curve columns have different lengths")]
    LengthMismatch,

    #[error("no observations of {image} fall within the model time domain")]
    NoDataInDomain { image: String },

    #[error("band {band} of {image} has {actual} points, at least {minimum} required")]
    InsufficientPoints {
        image: String,
        band: String,
        actual: usize,
        minimum: usize,
    },

    #[error("no valid {0} left to fit")]
    NoValidCandidates(&'static str),

    #[error("no observation with positive flux to build {0}")]
    NoPositiveFlux(&'static str),
}

/// Numerical breakdown, recovered locally wherever a likelihood is evaluated
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum NumericalError {
    #[error("covariance matrix is not positive definite")]
    SingularCovariance,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("posterior has no sample with finite likelihood")]
    DegeneratePosterior,

    #[error("no live point replacement found at iteration {iteration}")]
    SamplerStalled { iteration: usize },
}

/// Error returned from the fitting routines
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Numerical(#[from] NumericalError),

    #[error(transparent)]
    Quantile(#[from] QuantileError),
}

impl FitError {
    /// Whether selection loops may skip the candidate that produced this error
    pub fn is_skippable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

/// A batch item that could not be fitted
#[derive(Debug, thiserror::Error, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[error("light curve #{index} failed: {message}")]
pub struct FitFailure {
    pub index: usize,
    pub message: String,
}
