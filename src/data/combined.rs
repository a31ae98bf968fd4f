use crate::data::{LightCurveTable, MultiImageLightCurve, Observation};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single light curve made of all images shifted to the reference frame
///
/// Every image is moved by its time delay and divided by its magnification, then all rows are
/// merged in time order. `image[i]` is the index into `image_names` of the image row `i` comes
/// from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CombinedLightCurve {
    pub table: LightCurveTable,
    pub image: Vec<usize>,
    pub image_names: Vec<String>,
    pub delays: BTreeMap<String, f64>,
    pub magnifications: BTreeMap<String, f64>,
}

impl CombinedLightCurve {
    /// Images absent from `delays` or `magnifications` are not shifted or scaled
    pub fn new(
        curves: &MultiImageLightCurve,
        delays: &BTreeMap<String, f64>,
        magnifications: &BTreeMap<String, f64>,
    ) -> Self {
        let image_names: Vec<String> = curves.images.keys().cloned().collect();
        let delays: BTreeMap<String, f64> = image_names
            .iter()
            .map(|name| (name.clone(), delays.get(name).copied().unwrap_or(0.0)))
            .collect();
        let magnifications: BTreeMap<String, f64> = image_names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    magnifications.get(name).copied().unwrap_or(1.0),
                )
            })
            .collect();

        let aligned = curves
            .images
            .iter()
            .enumerate()
            .map(|(index, (name, table))| {
                let table = table
                    .aligned(delays[name], magnifications[name])
                    .sorted_by_time();
                table
                    .iter()
                    .map(|obs| (index, obs))
                    .collect::<Vec<(usize, Observation)>>()
            })
            .collect::<Vec<_>>();
        let (image, observations): (Vec<usize>, Vec<Observation>) = aligned
            .into_iter()
            .kmerge_by(|a, b| a.1.time < b.1.time)
            .unzip();

        Self {
            table: LightCurveTable::from_observations(observations),
            image,
            image_names,
            delays,
            magnifications,
        }
    }

    /// Row indices of the image with index `image`
    pub fn image_rows(&self, image: usize) -> impl Iterator<Item = usize> + '_ {
        self.image
            .iter()
            .enumerate()
            .filter(move |&(_, &idx)| idx == image)
            .map(|(i, _)| i)
    }

    pub fn image_index(&self, name: &str) -> Option<usize> {
        self.image_names.iter().position(|n| n == name)
    }

    /// Rows of a single image, still in the reference frame
    pub fn image_table(&self, image: usize) -> LightCurveTable {
        self.table.select(|i| self.image[i] == image)
    }

    /// Rows with `lower <= time <= upper` in the reference frame
    pub fn within_time(&self, lower: f64, upper: f64) -> Self {
        let keep = |i: usize| (lower..=upper).contains(&self.table.time[i]);
        Self {
            table: self.table.select(keep),
            image: (0..self.image.len())
                .filter(|&i| keep(i))
                .map(|i| self.image[i])
                .collect(),
            image_names: self.image_names.clone(),
            delays: self.delays.clone(),
            magnifications: self.magnifications.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(time: Vec<f64>, flux: f64) -> LightCurveTable {
        let n = time.len();
        LightCurveTable::new(
            time,
            vec!["r".to_owned(); n],
            vec![flux; n],
            vec![1.0; n],
            vec![25.0; n],
            vec!["ab".to_owned(); n],
        )
        .unwrap()
    }

    #[test]
    fn images_are_aligned_and_merged() {
        let curves = MultiImageLightCurve::new([
            ("a".to_owned(), table(vec![0.0, 2.0, 4.0], 10.0)),
            ("b".to_owned(), table(vec![11.0, 13.0], 20.0)),
        ])
        .unwrap();
        let delays = BTreeMap::from([("b".to_owned(), 10.0)]);
        let mags = BTreeMap::from([("b".to_owned(), 2.0)]);
        let combined = CombinedLightCurve::new(&curves, &delays, &mags);
        assert_eq!(combined.table.time.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(combined.table.flux.to_vec(), vec![10.0; 5]);
        assert_eq!(combined.image, vec![0, 1, 0, 1, 0]);
        assert_eq!(combined.image_rows(1).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(combined.delays["a"], 0.0);
        assert_eq!(combined.image_table(1).fluxerr.to_vec(), vec![0.5, 0.5]);
    }

    #[test]
    fn time_cut_keeps_image_indices() {
        let curves = MultiImageLightCurve::new([
            ("a".to_owned(), table(vec![0.0, 2.0, 4.0], 10.0)),
            ("b".to_owned(), table(vec![1.0, 3.0], 20.0)),
        ])
        .unwrap();
        let combined = CombinedLightCurve::new(&curves, &BTreeMap::new(), &BTreeMap::new())
            .within_time(1.5, 3.5);
        assert_eq!(combined.table.time.to_vec(), vec![2.0, 3.0]);
        assert_eq!(combined.image, vec![0, 1]);
    }
}
