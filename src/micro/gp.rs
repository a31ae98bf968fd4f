use crate::error::NumericalError;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::StandardNormal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Squared exponential kernel, `s^2 exp(-(x - x')^2 / (2 l^2))`
///
/// If `bounds` is `Some`, the length scale is optimized within them by maximizing the
/// marginal likelihood, otherwise `length_scale` is used as is.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RbfKernel {
    pub length_scale: f64,
    pub bounds: Option<(f64, f64)>,
}

impl RbfKernel {
    pub fn new(length_scale: f64, bounds: Option<(f64, f64)>) -> Self {
        Self {
            length_scale,
            bounds,
        }
    }

    #[inline]
    pub fn default_length_scale() -> f64 {
        10.0
    }

    #[inline]
    pub fn default_bounds() -> Option<(f64, f64)> {
        Some((20.0, 50.0))
    }

    fn candidates(&self) -> Vec<f64> {
        const GRID: usize = 16;
        match self.bounds {
            Some((lower, upper)) => (0..GRID)
                .map(|i| lower * (upper / lower).powf(i as f64 / (GRID - 1) as f64))
                .collect(),
            None => vec![self.length_scale],
        }
    }
}

impl Default for RbfKernel {
    fn default() -> Self {
        Self::new(Self::default_length_scale(), Self::default_bounds())
    }
}

fn rbf(x1: f64, x2: f64, length_scale: f64, variance: f64) -> f64 {
    variance * f64::exp(-0.5 * ((x1 - x2) / length_scale).powi(2))
}

/// One-dimensional Gaussian process regression with a constant prior mean and known
/// heteroscedastic noise
#[derive(Clone, Debug)]
pub struct GaussianProcess {
    x: Vec<f64>,
    mean: f64,
    length_scale: f64,
    signal_variance: f64,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
}

impl GaussianProcess {
    /// Condition the process on observations `y` at `x` with noise variances `noise`
    ///
    /// Kernel hyperparameters are chosen on a grid by the marginal likelihood.
    pub fn fit(
        x: &[f64],
        y: &[f64],
        noise: &[f64],
        mean: f64,
        kernel: RbfKernel,
    ) -> Result<Self, NumericalError> {
        if x.is_empty() || x.len() != y.len() || x.len() != noise.len() {
            return Err(NumericalError::NonFinite("Gaussian process training data"));
        }
        if x.iter().chain(y).chain(noise).any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite("Gaussian process training data"));
        }

        let mut best: Option<Self> = None;
        for length_scale in kernel.candidates() {
            for signal_variance in (-12..=2).map(|p| f64::powf(10.0, 0.5 * p as f64)) {
                let Ok(gp) = Self::condition(x, y, noise, mean, length_scale, signal_variance)
                else {
                    continue;
                };
                if best
                    .as_ref()
                    .is_none_or(|b| gp.log_marginal_likelihood > b.log_marginal_likelihood)
                {
                    best = Some(gp);
                }
            }
        }
        best.ok_or(NumericalError::SingularCovariance)
    }

    fn condition(
        x: &[f64],
        y: &[f64],
        noise: &[f64],
        mean: f64,
        length_scale: f64,
        signal_variance: f64,
    ) -> Result<Self, NumericalError> {
        let n = x.len();
        let k = DMatrix::from_fn(n, n, |i, j| {
            rbf(x[i], x[j], length_scale, signal_variance) + if i == j { noise[i] } else { 0.0 }
        });
        let chol = Cholesky::new(k).ok_or(NumericalError::SingularCovariance)?;
        let y = DVector::from_iterator(n, y.iter().map(|y| y - mean));
        let alpha = chol.solve(&y);
        let ln_det_half: f64 = chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
        let log_marginal_likelihood =
            -0.5 * y.dot(&alpha) - ln_det_half - 0.5 * n as f64 * TAU.ln();
        if !log_marginal_likelihood.is_finite() {
            return Err(NumericalError::NonFinite("log marginal likelihood"));
        }
        Ok(Self {
            x: x.to_vec(),
            mean,
            length_scale,
            signal_variance,
            chol,
            alpha,
            log_marginal_likelihood,
        })
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn signal_variance(&self) -> f64 {
        self.signal_variance
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    fn cross_covariance(&self, x_new: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(self.x.len(), x_new.len(), |i, j| {
            rbf(self.x[i], x_new[j], self.length_scale, self.signal_variance)
        })
    }

    /// Posterior mean and standard deviation at `x_new`
    pub fn predict(&self, x_new: &[f64]) -> Result<(Vec<f64>, Vec<f64>), NumericalError> {
        let k_star = self.cross_covariance(x_new);
        let mean = k_star.tr_mul(&self.alpha).add_scalar(self.mean);
        let v = self
            .chol
            .l()
            .solve_lower_triangular(&k_star)
            .ok_or(NumericalError::SingularCovariance)?;
        let std = v
            .column_iter()
            .map(|col| (self.signal_variance - col.norm_squared()).max(0.0).sqrt())
            .collect();
        Ok((mean.iter().copied().collect(), std))
    }

    /// Draw `n_samples` functions from the posterior at `x_new`
    pub fn sample<R: Rng + ?Sized>(
        &self,
        x_new: &[f64],
        n_samples: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<f64>>, NumericalError> {
        let m = x_new.len();
        let k_star = self.cross_covariance(x_new);
        let mean = k_star.tr_mul(&self.alpha).add_scalar(self.mean);
        let v = self
            .chol
            .l()
            .solve_lower_triangular(&k_star)
            .ok_or(NumericalError::SingularCovariance)?;
        let cov = DMatrix::from_fn(m, m, |i, j| {
            rbf(x_new[i], x_new[j], self.length_scale, self.signal_variance)
        }) - v.tr_mul(&v);

        // the dense grid makes the posterior covariance numerically rank deficient
        let mut jitter = 1e-10 * self.signal_variance;
        let l = loop {
            let mut jittered = cov.clone();
            for i in 0..m {
                jittered[(i, i)] += jitter;
            }
            if let Some(chol) = Cholesky::new(jittered) {
                break chol.unpack();
            }
            jitter *= 10.0;
            if jitter > self.signal_variance {
                return Err(NumericalError::SingularCovariance);
            }
        };

        Ok((0..n_samples)
            .map(|_| {
                let z = DVector::from_fn(m, |_, _| rng.sample::<f64, _>(StandardNormal));
                (&mean + &l * z).iter().copied().collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn data() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 2.0).collect();
        let y: Vec<f64> = x.iter().map(|&x| 1.0 + 0.1 * f64::sin(x / 15.0)).collect();
        let noise = vec![1e-4; x.len()];
        (x, y, noise)
    }

    #[test]
    fn interpolates_smooth_function() {
        let (x, y, noise) = data();
        let gp = GaussianProcess::fit(&x, &y, &noise, 1.0, RbfKernel::default()).unwrap();
        assert!((20.0..=50.0).contains(&gp.length_scale()));
        let x_new = [15.0, 31.0, 44.0];
        let (mean, std) = gp.predict(&x_new).unwrap();
        for ((&x, m), s) in x_new.iter().zip(mean).zip(std) {
            assert_relative_eq!(m, 1.0 + 0.1 * f64::sin(x / 15.0), epsilon = 0.02);
            assert!(s < 0.05);
        }
    }

    #[test]
    fn samples_scatter_around_mean() {
        let (x, y, noise) = data();
        let gp = GaussianProcess::fit(&x, &y, &noise, 1.0, RbfKernel::default()).unwrap();
        let x_new: Vec<f64> = (0..50).map(|i| i as f64 * 1.2).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let samples = gp.sample(&x_new, 200, &mut rng).unwrap();
        assert_eq!(samples.len(), 200);
        let (mean, _) = gp.predict(&x_new).unwrap();
        let average = samples.iter().map(|s| s[10]).sum::<f64>() / 200.0;
        assert_relative_eq!(average, mean[10], epsilon = 0.02);
    }

    #[test]
    fn fixed_length_scale() {
        let (x, y, noise) = data();
        let gp =
            GaussianProcess::fit(&x, &y, &noise, 1.0, RbfKernel::new(7.0, None)).unwrap();
        assert_eq!(gp.length_scale(), 7.0);
    }

    #[test]
    fn invalid_input() {
        assert!(GaussianProcess::fit(&[], &[], &[], 1.0, RbfKernel::default()).is_err());
        assert!(
            GaussianProcess::fit(&[0.0], &[f64::NAN], &[1.0], 1.0, RbfKernel::default()).is_err()
        );
    }
}
