//! One-dimensional priors of the sampled parameters

mod inverse_cdf;
pub use inverse_cdf::InverseCdf;

mod ln_prior_1d;
pub use ln_prior_1d::{
    EmpiricalLnPrior1D, LnPrior1D, LnPrior1DTrait, LogNormalLnPrior1D, LogUniformLnPrior1D,
    MixLnPrior1D, NoneLnPrior1D, NormalLnPrior1D, UniformLnPrior1D,
};

mod source;
pub use source::PriorSource;
