use crate::error::NumericalError;
use crate::prior::{LnPrior1D, LnPrior1DTrait};

use serde::{Deserialize, Serialize};

/// Quantile function of a one-dimensional prior, maps `u` from the unit interval to the
/// parameter value
///
/// Stored as knots `(cdf, x)` interpolated linearly, two knots for a uniform prior.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InverseCdf {
    cdf: Vec<f64>,
    x: Vec<f64>,
}

impl InverseCdf {
    /// Number of grid points to tabulate a non-uniform density on
    pub const DEFAULT_GRID_SIZE: usize = 101;

    pub fn uniform(lower: f64, upper: f64) -> Self {
        Self {
            cdf: vec![0.0, 1.0],
            x: vec![lower, upper],
        }
    }

    /// Tabulate `prior` truncated to `[lower, upper]` on `grid_size` evenly spaced points
    pub fn from_density(
        prior: &LnPrior1D,
        lower: f64,
        upper: f64,
        grid_size: usize,
    ) -> Result<Self, NumericalError> {
        let grid_size = grid_size.max(2);
        let step = (upper - lower) / (grid_size - 1) as f64;
        let x: Vec<f64> = (0..grid_size).map(|i| lower + step * i as f64).collect();
        let density: Vec<f64> = x
            .iter()
            .map(|&x| {
                let p = prior.density(x);
                if p.is_finite() && p > 0.0 { p } else { 0.0 }
            })
            .collect();

        // trapezoidal rule
        let mut cdf = Vec::with_capacity(grid_size);
        cdf.push(0.0);
        for i in 1..grid_size {
            cdf.push(cdf[i - 1] + 0.5 * (density[i - 1] + density[i]) * step);
        }
        let total = cdf[grid_size - 1];
        if !(total > 0.0) || !total.is_finite() {
            return Err(NumericalError::NonFinite("prior density normalization"));
        }
        cdf.iter_mut().for_each(|c| *c /= total);

        Ok(Self { cdf, x })
    }

    pub fn lower(&self) -> f64 {
        self.x[0]
    }

    pub fn upper(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Parameter value at the unit-interval coordinate `u`
    pub fn ppf(&self, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        let i = self.cdf.partition_point(|&c| c < u).clamp(1, self.cdf.len() - 1);
        let (c0, c1) = (self.cdf[i - 1], self.cdf[i]);
        if c1 <= c0 {
            return self.x[i];
        }
        self.x[i - 1] + (u - c0) / (c1 - c0) * (self.x[i] - self.x[i - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn uniform() {
        let icdf = InverseCdf::uniform(-2.0, 6.0);
        assert_relative_eq!(icdf.ppf(0.0), -2.0);
        assert_relative_eq!(icdf.ppf(0.25), 0.0);
        assert_relative_eq!(icdf.ppf(1.0), 6.0);
    }

    #[test]
    fn normal_median_and_quartiles() {
        let icdf =
            InverseCdf::from_density(&LnPrior1D::normal(3.0, 2.0), -7.0, 13.0, 1001).unwrap();
        assert_relative_eq!(icdf.ppf(0.5), 3.0, epsilon = 1e-6);
        // quartiles of the normal distribution are at +-0.6745 sigma
        assert_relative_eq!(icdf.ppf(0.75), 3.0 + 0.6745 * 2.0, epsilon = 2e-3);
        assert_relative_eq!(icdf.ppf(0.25), 3.0 - 0.6745 * 2.0, epsilon = 2e-3);
    }

    #[test]
    fn zero_density_regions_are_skipped() {
        let prior = LnPrior1D::uniform(4.0, 6.0);
        let icdf = InverseCdf::from_density(&prior, 0.0, 10.0, 101).unwrap();
        for u in [0.01, 0.5, 0.99] {
            let x = icdf.ppf(u);
            assert!((3.9..=6.1).contains(&x), "{x}");
        }
    }

    #[test]
    fn vanishing_density() {
        let prior = LnPrior1D::uniform(20.0, 30.0);
        assert!(InverseCdf::from_density(&prior, 0.0, 10.0, 101).is_err());
    }
}
