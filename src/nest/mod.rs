//! Nested sampling of posterior distributions and Bayesian evidence

mod ellipsoid;

mod likelihood;
pub use likelihood::{ChiSquare, Shift, color_loglike};

mod params;
pub use params::{ParamSpec, ParameterBounds, ParameterSpace, Resolved, TieFn, Ties};

mod result;
pub use result::FitResult;

mod sampler;
pub use sampler::{NestedSampler, SamplerConfig, SamplerMethod};
