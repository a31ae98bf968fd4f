use crate::data::LightCurveTable;
use crate::model::PhotometricModel;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Achromatic magnification curve tabulated in the rest-frame phase `(t - t0) / (1 + z)`
///
/// Linearly interpolated between the knots and equal to unity outside of them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AchromaticMicrolensing {
    phase: Vec<f64>,
    magnification: Vec<f64>,
}

impl AchromaticMicrolensing {
    /// `phase` must be sorted and of the same length as `magnification`
    pub fn new(phase: Vec<f64>, magnification: Vec<f64>) -> Self {
        assert_eq!(phase.len(), magnification.len());
        Self {
            phase,
            magnification,
        }
    }

    pub fn magnification(&self, phase: f64) -> f64 {
        let n = self.phase.len();
        if n == 0 || phase < self.phase[0] || phase > self.phase[n - 1] {
            return 1.0;
        }
        let i = self.phase.partition_point(|&x| x <= phase);
        if i == n {
            return self.magnification[n - 1];
        }
        let (x0, x1) = (self.phase[i - 1], self.phase[i]);
        let (y0, y1) = (self.magnification[i - 1], self.magnification[i]);
        if x1 == x0 {
            return y0;
        }
        y0 + (phase - x0) / (x1 - x0) * (y1 - y0)
    }
}

/// Model with its flux multiplied by a microlensing curve
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Microlensed<M> {
    pub inner: M,
    pub lens: AchromaticMicrolensing,
}

impl<M: PhotometricModel> Microlensed<M> {
    pub fn new(inner: M, lens: AchromaticMicrolensing) -> Self {
        Self { inner, lens }
    }

    fn factor(&self, params: &[f64], time: f64) -> f64 {
        let t0 = self
            .inner
            .param_index(self.inner.t0_name())
            .map_or(0.0, |i| params[i]);
        let phase = (time - t0) / (1.0 + self.inner.redshift(params));
        self.lens.magnification(phase)
    }
}

impl<M: PhotometricModel> PhotometricModel for Microlensed<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn param_names(&self) -> &[String] {
        self.inner.param_names()
    }

    fn parameters(&self) -> &[f64] {
        self.inner.parameters()
    }

    fn parameters_mut(&mut self) -> &mut [f64] {
        self.inner.parameters_mut()
    }

    fn amplitude_name(&self) -> &str {
        self.inner.amplitude_name()
    }

    fn t0_name(&self) -> &str {
        self.inner.t0_name()
    }

    fn bandflux(&self, params: &[f64], band: &str, time: f64, zp: f64, zpsys: &str) -> f64 {
        self.inner.bandflux(params, band, time, zp, zpsys) * self.factor(params, time)
    }

    fn time_domain(&self, params: &[f64]) -> (f64, f64) {
        self.inner.time_domain(params)
    }

    fn bandflux_covariance(&self, params: &[f64], data: &LightCurveTable) -> Option<Array2<f64>> {
        let mut cov = self.inner.bandflux_covariance(params, data)?;
        for i in 0..data.len() {
            let fi = self.factor(params, data.time[i]);
            for j in 0..data.len() {
                cov[[i, j]] *= fi * self.factor(params, data.time[j]);
            }
        }
        Some(cov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BazinModel;

    use approx::assert_relative_eq;

    #[test]
    fn interpolation() {
        let lens = AchromaticMicrolensing::new(vec![0.0, 10.0], vec![1.0, 2.0]);
        assert_relative_eq!(lens.magnification(5.0), 1.5);
        assert_relative_eq!(lens.magnification(10.0), 2.0);
        assert_relative_eq!(lens.magnification(-1.0), 1.0);
        assert_relative_eq!(lens.magnification(11.0), 1.0);
    }

    #[test]
    fn lensed_flux_is_multiplied() {
        let model = BazinModel::default();
        let params = [1.0, 50.0, 100.0, 3.0, 20.0];
        // rest-frame phase 5 is observer time 60 at z = 1
        let lensed = Microlensed::new(
            model.clone(),
            AchromaticMicrolensing::new(vec![0.0, 10.0], vec![1.0, 2.0]),
        );
        assert_relative_eq!(
            lensed.bandflux(&params, "r", 60.0, 25.0, "ab"),
            1.5 * model.bandflux(&params, "r", 60.0, 25.0, "ab"),
            max_relative = 1e-12,
        );
        assert_eq!(lensed.param_names(), model.param_names());
    }
}
