//! Gaussian log-likelihoods of light curve data
//!
//! All functions take the model parameters explicitly and return `-inf` instead of NaN: when no
//! observation falls in the model time domain, when a covariance matrix is singular and when any
//! term is not finite.

use crate::data::{ColorTable, LightCurveTable};
use crate::model::PhotometricModel;

use nalgebra::{Cholesky, DMatrix, DVector};

/// Per-observation shift to the model frame: `time - delay`, `flux / scale`
pub type Shift = (f64, f64);

/// Flux chi-square likelihood of a light curve table
#[derive(Clone, Copy, Debug)]
pub struct ChiSquare<'a, M> {
    pub model: &'a M,
    pub data: &'a LightCurveTable,
    /// Add the model flux covariance to the data errors, if the model provides one
    pub model_covariance: bool,
}

impl<'a, M: PhotometricModel> ChiSquare<'a, M> {
    pub fn new(model: &'a M, data: &'a LightCurveTable, model_covariance: bool) -> Self {
        Self {
            model,
            data,
            model_covariance,
        }
    }

    pub fn loglike(&self, params: &[f64]) -> f64 {
        self.loglike_shifted(params, |_| (0.0, 1.0))
    }

    /// Log-likelihood with observation `i` moved by `shift(i)` before comparing with the model
    ///
    /// Model flux is zero outside the model time domain.
    pub fn loglike_shifted(&self, params: &[f64], shift: impl Fn(usize) -> Shift) -> f64 {
        let data = self.data;
        let n = data.len();
        let (lower, upper) = self.model.time_domain(params);

        let mut any_in_domain = false;
        let mut residual = Vec::with_capacity(n);
        let mut error = Vec::with_capacity(n);
        let mut time = Vec::with_capacity(n);
        for i in 0..n {
            let (delay, scale) = shift(i);
            let t = data.time[i] - delay;
            let model_flux = if (lower..=upper).contains(&t) {
                any_in_domain = true;
                self.model
                    .bandflux(params, &data.band[i], t, data.zp[i], &data.zpsys[i])
            } else {
                0.0
            };
            residual.push(data.flux[i] / scale - model_flux);
            error.push(data.fluxerr[i] / scale.abs());
            time.push(t);
        }
        if !any_in_domain {
            return f64::NEG_INFINITY;
        }

        let model_cov = if self.model_covariance {
            let shifted = LightCurveTable {
                time: time.into(),
                ..data.clone()
            };
            self.model.bandflux_covariance(params, &shifted)
        } else {
            None
        };
        let chi2 = match model_cov {
            Some(cov) => {
                let cov = DMatrix::from_fn(n, n, |i, j| {
                    cov[[i, j]] + if i == j { error[i].powi(2) } else { 0.0 }
                });
                match covariance_chi2(cov, DVector::from_vec(residual)) {
                    Some(chi2) => chi2,
                    None => return f64::NEG_INFINITY,
                }
            }
            None => residual
                .iter()
                .zip(error.iter())
                .map(|(r, e)| (r / e).powi(2))
                .sum(),
        };
        finite_or_neg_inf(-0.5 * chi2)
    }
}

/// `r^T C^-1 r`, `None` for a singular or non-finite covariance
pub(crate) fn covariance_chi2(cov: DMatrix<f64>, residual: DVector<f64>) -> Option<f64> {
    if cov.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let chol = Cholesky::new(cov)?;
    let x = chol.solve(&residual);
    Some(residual.dot(&x))
}

/// Color chi-square likelihood, `shift(image)` is the time offset of an image
pub fn color_loglike<M: PhotometricModel>(
    model: &M,
    params: &[f64],
    colors: &ColorTable,
    shift: impl Fn(usize) -> f64,
) -> f64 {
    let (lower, upper) = model.time_domain(params);
    let bands = (colors.bands.0.as_str(), colors.bands.1.as_str());
    let mut any_in_domain = false;
    let mut chi2 = 0.0;
    for i in 0..colors.len() {
        let t = colors.time[i] - shift(colors.image[i]);
        any_in_domain |= (lower..=upper).contains(&t);
        let model_color = model.color(params, bands, t, &colors.zpsys[i]);
        chi2 += ((colors.color[i] - model_color) / colors.color_err[i]).powi(2);
    }
    if !any_in_domain {
        return f64::NEG_INFINITY;
    }
    finite_or_neg_inf(-0.5 * chi2)
}

#[inline]
fn finite_or_neg_inf(x: f64) -> f64 {
    if x.is_finite() { x } else { f64::NEG_INFINITY }
}
