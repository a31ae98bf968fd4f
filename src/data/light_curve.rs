use crate::error::DataError;

use itertools::Itertools;
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single photometric measurement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub time: f64,
    pub band: String,
    pub flux: f64,
    pub fluxerr: f64,
    pub zp: f64,
    pub zpsys: String,
}

/// Photometry of a single image
///
/// Columns are stored separately, the same index in every column is the same measurement. Flux
/// and its error are measured in the system where `mag = -2.5 log10(flux) + zp`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LightCurveTable {
    pub time: Array1<f64>,
    pub band: Vec<String>,
    pub flux: Array1<f64>,
    pub fluxerr: Array1<f64>,
    pub zp: Array1<f64>,
    pub zpsys: Vec<String>,
}

impl LightCurveTable {
    /// Construct from columns, all of them must have the same length
    pub fn new(
        time: impl Into<Array1<f64>>,
        band: Vec<String>,
        flux: impl Into<Array1<f64>>,
        fluxerr: impl Into<Array1<f64>>,
        zp: impl Into<Array1<f64>>,
        zpsys: Vec<String>,
    ) -> Result<Self, DataError> {
        let table = Self {
            time: time.into(),
            band,
            flux: flux.into(),
            fluxerr: fluxerr.into(),
            zp: zp.into(),
            zpsys,
        };
        let n = table.time.len();
        if [
            table.band.len(),
            table.flux.len(),
            table.fluxerr.len(),
            table.zp.len(),
            table.zpsys.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(DataError::LengthMismatch);
        }
        Ok(table)
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let (time, band, flux, fluxerr, zp, zpsys): (Vec<_>, Vec<_>, Vec<_>, Vec<_>, Vec<_>, Vec<_>) =
            observations
                .into_iter()
                .map(|obs| (obs.time, obs.band, obs.flux, obs.fluxerr, obs.zp, obs.zpsys))
                .multiunzip();
        Self {
            time: time.into(),
            band,
            flux: flux.into(),
            fluxerr: fluxerr.into(),
            zp: zp.into(),
            zpsys,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observation(&self, i: usize) -> Observation {
        Observation {
            time: self.time[i],
            band: self.band[i].clone(),
            flux: self.flux[i],
            fluxerr: self.fluxerr[i],
            zp: self.zp[i],
            zpsys: self.zpsys[i].clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        (0..self.len()).map(|i| self.observation(i))
    }

    pub fn bands(&self) -> BTreeSet<String> {
        self.band.iter().cloned().collect()
    }

    pub fn band_count(&self, band: &str) -> usize {
        self.band.iter().filter(|b| *b == band).count()
    }

    /// Rows for which `predicate(row_index)` holds, order is kept
    pub fn select(&self, predicate: impl Fn(usize) -> bool) -> Self {
        Self::from_observations((0..self.len()).filter(|&i| predicate(i)).map(|i| self.observation(i)))
    }

    pub fn with_bands(&self, bands: &BTreeSet<String>) -> Self {
        self.select(|i| bands.contains(&self.band[i]))
    }

    pub fn only_band(&self, band: &str) -> Self {
        self.select(|i| self.band[i] == band)
    }

    /// Rows with `lower <= time <= upper`
    pub fn within_time(&self, lower: f64, upper: f64) -> Self {
        self.select(|i| (lower..=upper).contains(&self.time[i]))
    }

    /// Copy moved to the frame of another image: `time - delay`, `flux / magnification`
    pub fn aligned(&self, delay: f64, magnification: f64) -> Self {
        Self {
            time: &self.time - delay,
            band: self.band.clone(),
            flux: &self.flux / magnification,
            fluxerr: &self.fluxerr / magnification.abs(),
            zp: self.zp.clone(),
            zpsys: self.zpsys.clone(),
        }
    }

    pub fn sorted_by_time(&self) -> Self {
        let order = (0..self.len())
            .sorted_by(|&a, &b| self.time[a].total_cmp(&self.time[b]))
            .collect::<Vec<_>>();
        Self::from_observations(order.into_iter().map(|i| self.observation(i)))
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.time
            .iter()
            .copied()
            .minmax_by(f64::total_cmp)
            .into_option()
    }

    /// Sum of per-point signal-to-noise ratios, `sum(flux / fluxerr)`
    pub fn signal_to_noise(&self) -> f64 {
        Zip::from(&self.flux)
            .and(&self.fluxerr)
            .fold(0.0, |acc, &f, &e| acc + f / e)
    }

    /// Signal-to-noise of a single band scaled with its size, `sum(flux / fluxerr) * sqrt(n)`
    pub fn band_signal_to_noise(&self, band: &str) -> f64 {
        let (snr, n) = (0..self.len())
            .filter(|&i| self.band[i] == band)
            .fold((0.0, 0usize), |(snr, n), i| {
                (snr + self.flux[i] / self.fluxerr[i], n + 1)
            });
        snr * (n as f64).sqrt()
    }
}

impl FromIterator<Observation> for LightCurveTable {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self::from_observations(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn table() -> LightCurveTable {
        LightCurveTable::new(
            vec![3.0, 1.0, 2.0, 4.0],
            vec!["g".into(), "r".into(), "g".into(), "r".into()],
            vec![10.0, 20.0, 30.0, 40.0],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![25.0; 4],
            vec!["ab".into(); 4],
        )
        .unwrap()
    }

    #[test]
    fn length_mismatch() {
        let result = LightCurveTable::new(
            vec![1.0, 2.0],
            vec!["g".into()],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            vec![25.0, 25.0],
            vec!["ab".into(), "ab".into()],
        );
        assert_eq!(result, Err(DataError::LengthMismatch));
    }

    #[test]
    fn bands_and_counts() {
        let t = table();
        assert_eq!(t.bands().into_iter().collect::<Vec<_>>(), vec!["g", "r"]);
        assert_eq!(t.band_count("g"), 2);
        assert_eq!(t.only_band("r").flux.to_vec(), vec![20.0, 40.0]);
    }

    #[test]
    fn signal_to_noise() {
        let t = table();
        assert_relative_eq!(t.signal_to_noise(), 40.0);
        assert_relative_eq!(t.band_signal_to_noise("g"), 20.0 * 2f64.sqrt());
    }

    #[test]
    fn aligned_and_sorted() {
        let t = table().aligned(1.0, 2.0).sorted_by_time();
        assert_eq!(t.time.to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(t.flux.to_vec(), vec![10.0, 15.0, 5.0, 20.0]);
        assert_eq!(t.fluxerr.to_vec(), vec![1.0, 1.5, 0.5, 2.0]);
        assert_eq!(t.time_range(), Some((0.0, 3.0)));
    }

    #[test]
    fn within_time() {
        let t = table().within_time(1.5, 3.0);
        assert_eq!(t.time.to_vec(), vec![3.0, 2.0]);
    }
}
