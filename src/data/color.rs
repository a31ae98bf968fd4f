use crate::data::{LightCurveTable, MultiImageLightCurve};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::LN_10;

/// Color curve of all images, `mag(bands.0) - mag(bands.1)` versus time
///
/// Each color point comes from two observations of the same image in different bands taken
/// within a matching tolerance, the time of the point is the time of the first band
/// observation. Only observations with positive flux make a color point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColorTable {
    pub bands: (String, String),
    pub time: Array1<f64>,
    pub color: Array1<f64>,
    pub color_err: Array1<f64>,
    pub zpsys: Vec<String>,
    pub image: Vec<usize>,
    pub image_names: Vec<String>,
    pub delays: BTreeMap<String, f64>,
}

impl ColorTable {
    /// Build color points for all images, shifting each by its entry in `delays` (zero if absent)
    pub fn new(
        curves: &MultiImageLightCurve,
        bands: (&str, &str),
        delays: &BTreeMap<String, f64>,
        tolerance: f64,
    ) -> Self {
        let image_names: Vec<String> = curves.images.keys().cloned().collect();
        let delays: BTreeMap<String, f64> = image_names
            .iter()
            .map(|name| (name.clone(), delays.get(name).copied().unwrap_or(0.0)))
            .collect();

        let mut points: Vec<(usize, ColorPoint)> = vec![];
        for (index, (name, table)) in curves.images.iter().enumerate() {
            let shifted = table.aligned(delays[name], 1.0);
            points.extend(
                match_bands(&shifted, bands, tolerance)
                    .into_iter()
                    .map(|p| (index, p)),
            );
        }
        points.sort_by(|a, b| a.1.time.total_cmp(&b.1.time));

        Self {
            bands: (bands.0.to_owned(), bands.1.to_owned()),
            time: points.iter().map(|(_, p)| p.time).collect(),
            color: points.iter().map(|(_, p)| p.color).collect(),
            color_err: points.iter().map(|(_, p)| p.color_err).collect(),
            zpsys: points.iter().map(|(_, p)| p.zpsys.clone()).collect(),
            image: points.iter().map(|&(i, _)| i).collect(),
            image_names,
            delays,
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

    /// Points with `lower <= time <= upper` in the reference frame
    pub fn within_time(&self, lower: f64, upper: f64) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| (lower..=upper).contains(&self.time[i]))
            .collect();
        Self {
            bands: self.bands.clone(),
            time: keep.iter().map(|&i| self.time[i]).collect(),
            color: keep.iter().map(|&i| self.color[i]).collect(),
            color_err: keep.iter().map(|&i| self.color_err[i]).collect(),
            zpsys: keep.iter().map(|&i| self.zpsys[i].clone()).collect(),
            image: keep.iter().map(|&i| self.image[i]).collect(),
            image_names: self.image_names.clone(),
            delays: self.delays.clone(),
        }
    }

    /// Number of color points of the image with index `image`
    pub fn image_len(&self, image: usize) -> usize {
        self.image.iter().filter(|&&i| i == image).count()
    }
}

struct ColorPoint {
    time: f64,
    color: f64,
    color_err: f64,
    zpsys: String,
}

/// Greedily pair every first-band observation with the nearest unused second-band one
fn match_bands(table: &LightCurveTable, bands: (&str, &str), tolerance: f64) -> Vec<ColorPoint> {
    let positive = |i: usize| table.flux[i] > 0.0 && table.fluxerr[i].is_finite();
    let first: Vec<usize> = (0..table.len())
        .filter(|&i| table.band[i] == bands.0 && positive(i))
        .collect();
    let mut second: Vec<Option<usize>> = (0..table.len())
        .filter(|&i| table.band[i] == bands.1 && positive(i))
        .map(Some)
        .collect();

    let mut points = vec![];
    for i in first {
        let nearest = second
            .iter()
            .enumerate()
            .filter_map(|(slot, j)| j.map(|j| (slot, j, (table.time[j] - table.time[i]).abs())))
            .filter(|&(_, _, dt)| dt <= tolerance)
            .min_by(|a, b| a.2.total_cmp(&b.2));
        let Some((slot, j, _)) = nearest else {
            continue;
        };
        second[slot] = None;

        let (f1, f2) = (table.flux[i], table.flux[j]);
        let color = -2.5 * f64::log10(f1 / f2) + table.zp[i] - table.zp[j];
        let color_err = 2.5 / LN_10
            * f64::hypot(table.fluxerr[i] / f1, table.fluxerr[j] / f2);
        points.push(ColorPoint {
            time: table.time[i],
            color,
            color_err,
            zpsys: table.zpsys[i].clone(),
        });
    }
    points
}
