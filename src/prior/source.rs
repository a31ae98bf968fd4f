use crate::error::{ConfigurationError, FitError};
use crate::prior::{EmpiricalLnPrior1D, InverseCdf, LnPrior1D};

use serde::{Deserialize, Serialize};

/// Where the prior of a free parameter comes from
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum PriorSource {
    /// Uniform within bounds
    Flat { lower: f64, upper: f64 },
    /// Explicit density truncated to bounds
    Density {
        lower: f64,
        upper: f64,
        ln_prior: LnPrior1D,
    },
    /// Posterior of an earlier fit, smoothed by a kernel density estimate over the sample range
    Empirical { samples: Vec<f64>, weights: Vec<f64> },
}

impl PriorSource {
    /// Grid size of the empirical density tabulation
    pub const EMPIRICAL_GRID_SIZE: usize = 1000;

    pub fn flat(lower: f64, upper: f64) -> Self {
        Self::Flat { lower, upper }
    }

    pub fn inverse_cdf(&self, param: &str) -> Result<InverseCdf, FitError> {
        let check = |lower: f64, upper: f64| {
            if lower.is_finite() && upper.is_finite() && lower < upper {
                Ok(())
            } else {
                Err(ConfigurationError::InvalidBounds {
                    param: param.to_owned(),
                    lower,
                    upper,
                })
            }
        };
        match self {
            Self::Flat { lower, upper } => {
                check(*lower, *upper)?;
                Ok(InverseCdf::uniform(*lower, *upper))
            }
            Self::Density {
                lower,
                upper,
                ln_prior,
            } => {
                check(*lower, *upper)?;
                Ok(InverseCdf::from_density(
                    ln_prior,
                    *lower,
                    *upper,
                    InverseCdf::DEFAULT_GRID_SIZE,
                )?)
            }
            Self::Empirical { samples, weights } => {
                let kde = EmpiricalLnPrior1D::new(samples, weights)?;
                let (lower, upper) = kde.support();
                Ok(InverseCdf::from_density(
                    &kde.into(),
                    lower,
                    upper,
                    Self::EMPIRICAL_GRID_SIZE,
                )?)
            }
        }
    }
}
