use crate::error::FitError;
use crate::quantile::{Quantiles, weighted_quantile};

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Output of a nested sampling run
///
/// Rows of `samples` are the dead points followed by the final live points, columns follow
/// `vparam_names`. `weights` are posterior importance weights and need not be normalized.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FitResult {
    pub vparam_names: Vec<String>,
    pub samples: Array2<f64>,
    pub weights: Array1<f64>,
    pub logl: Array1<f64>,
    /// Natural logarithm of the evidence
    pub logz: f64,
    pub logzerr: f64,
    /// Information gain, natural units
    pub h: f64,
    pub niter: usize,
    pub ncall: usize,
    /// Weighted medians of the marginal posteriors
    pub best_fit: Vec<f64>,
}

impl FitResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        vparam_names: Vec<String>,
        samples: Array2<f64>,
        logwt: Array1<f64>,
        logl: Array1<f64>,
        logz: f64,
        h: f64,
        npoints: usize,
        ncall: usize,
    ) -> Result<Self, FitError> {
        let weights = logwt.mapv(|w| f64::exp(w - logz));
        let niter = samples.nrows();
        let best_fit = samples
            .columns()
            .into_iter()
            .map(|col| Ok(weighted_quantile(col, &[0.5], weights.view())?[0]))
            .collect::<Result<Vec<_>, FitError>>()?;
        Ok(Self {
            vparam_names,
            samples,
            weights,
            logl,
            logz,
            logzerr: (h / npoints as f64).sqrt(),
            h,
            niter,
            ncall,
            best_fit,
        })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vparam_names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.index_of(name).map(|i| self.samples.column(i))
    }

    pub fn best(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.best_fit[i])
    }

    /// Weighted 16th, 50th and 84th percentiles of a parameter
    pub fn param_quantiles(&self, name: &str) -> Option<Result<Quantiles, FitError>> {
        self.column(name)
            .map(|col| Ok(Quantiles::from_weighted(col, self.weights.view())?))
    }

    /// Arbitrary weighted quantiles of a parameter
    pub fn quantiles(&self, name: &str, q: &[f64]) -> Option<Result<Vec<f64>, FitError>> {
        self.column(name)
            .map(|col| Ok(weighted_quantile(col, q, self.weights.view())?))
    }

    /// Uncertainty of `logz` used to compare runs: `sqrt(h)`, or `sqrt(|0.1 logz|)` if the
    /// information is not usable
    pub fn evidence_error(&self) -> f64 {
        if self.h.is_finite() && self.h >= 0.0 {
            self.h.sqrt()
        } else {
            (0.1 * self.logz).abs().sqrt()
        }
    }

    /// Posterior samples and weights sorted by descending weight, stable for equal weights
    pub(crate) fn by_weight(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.weights.len()).collect();
        order.sort_by(|&a, &b| self.weights[b].total_cmp(&self.weights[a]));
        order
    }
}
