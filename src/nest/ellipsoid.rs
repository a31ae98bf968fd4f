use crate::error::NumericalError;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::ArrayView2;
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Ellipsoid `{x : (x - c)^T C^-1 (x - c) <= 1}` stored through the Cholesky factor of `C`
#[derive(Clone, Debug)]
pub(crate) struct Ellipsoid {
    center: DVector<f64>,
    cov: DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
}

impl Ellipsoid {
    fn new(center: DVector<f64>, cov: DMatrix<f64>) -> Result<Self, NumericalError> {
        let chol = Cholesky::new(cov.clone()).ok_or(NumericalError::SingularCovariance)?;
        Ok(Self { center, cov, chol })
    }

    /// The smallest ellipsoid with the shape of the sample covariance containing all `points`
    ///
    /// `points` are rows of the matrix, there must be more points than dimensions.
    pub(crate) fn bounding(points: ArrayView2<f64>) -> Result<Self, NumericalError> {
        let (npoints, ndim) = points.dim();
        if npoints <= ndim {
            return Err(NumericalError::SingularCovariance);
        }
        let rows = DMatrix::from_row_iterator(npoints, ndim, points.iter().copied());
        let center: DVector<f64> = rows.row_mean().transpose();
        let mut delta = rows;
        for mut row in delta.row_iter_mut() {
            row -= center.transpose();
        }
        let cov = delta.transpose() * &delta / (npoints - 1) as f64;
        let chol = Cholesky::new(cov.clone()).ok_or(NumericalError::SingularCovariance)?;

        let fmax = delta
            .row_iter()
            .map(|row| {
                let x = chol.solve(&row.transpose());
                row.dot(&x.transpose())
            })
            .fold(0.0, f64::max);
        if !fmax.is_finite() {
            return Err(NumericalError::NonFinite("bounding ellipsoid"));
        }
        Self::new(center, cov * fmax.max(f64::MIN_POSITIVE))
    }

    pub(crate) fn ndim(&self) -> usize {
        self.center.len()
    }

    pub(crate) fn ln_volume(&self) -> f64 {
        let ln_det_sqrt: f64 = self.chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
        ln_unit_ball_volume(self.ndim()) + ln_det_sqrt
    }

    /// Scale the ellipsoid to the given volume keeping its shape
    pub(crate) fn scaled_to_ln_volume(&self, ln_volume: f64) -> Result<Self, NumericalError> {
        let ln_factor = 2.0 * (ln_volume - self.ln_volume()) / self.ndim() as f64;
        Self::new(self.center.clone(), &self.cov * ln_factor.exp())
    }

    pub(crate) fn contains(&self, x: &[f64]) -> bool {
        let delta = DVector::from_column_slice(x) - &self.center;
        delta.dot(&self.chol.solve(&delta)) <= 1.0
    }

    /// Uniformly distributed point inside the ellipsoid
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let n = self.ndim();
        let mut z = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = z.norm();
        let radius = rng.random::<f64>().powf(1.0 / n as f64);
        z *= radius / norm;
        let x = &self.center + self.chol.l() * z;
        x.iter().copied().collect()
    }
}

fn ln_unit_ball_volume(n: usize) -> f64 {
    // V_n = V_{n-2} * 2 pi / n
    let mut ln_v = if n % 2 == 0 { 0.0 } else { f64::ln(2.0) };
    let mut k = n % 2;
    while k < n {
        k += 2;
        ln_v += f64::ln(2.0 * PI / k as f64);
    }
    ln_v
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::{Array2, array};
    use rand::prelude::*;

    #[test]
    fn unit_ball_volumes() {
        assert_relative_eq!(ln_unit_ball_volume(1).exp(), 2.0);
        assert_relative_eq!(ln_unit_ball_volume(2).exp(), PI);
        assert_relative_eq!(ln_unit_ball_volume(3).exp(), 4.0 / 3.0 * PI);
        assert_relative_eq!(ln_unit_ball_volume(4).exp(), PI * PI / 2.0);
    }

    #[test]
    fn bounding_contains_all_points() {
        let mut rng = StdRng::seed_from_u64(0);
        let points = Array2::from_shape_fn((50, 3), |(_, j)| {
            (j as f64 + 1.0) * rng.sample::<f64, _>(StandardNormal)
        });
        let ell = Ellipsoid::bounding(points.view()).unwrap();
        let ell = ell.scaled_to_ln_volume(ell.ln_volume() + 1e-9).unwrap();
        for row in points.rows() {
            assert!(ell.contains(&row.to_vec()));
        }
    }

    #[test]
    fn scaling_and_sampling() {
        let points = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.5]];
        let ell = Ellipsoid::bounding(points.view()).unwrap();
        let bigger = ell.scaled_to_ln_volume(ell.ln_volume() + 1.0).unwrap();
        assert_relative_eq!(bigger.ln_volume(), ell.ln_volume() + 1.0, epsilon = 1e-10);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let x = bigger.sample(&mut rng);
            let shrunk: Vec<f64> = x.iter().map(|v| 0.5 + (v - 0.5) * (1.0 - 1e-9)).collect();
            assert!(bigger.contains(&shrunk));
        }
    }
}
