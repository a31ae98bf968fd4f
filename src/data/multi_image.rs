use crate::data::LightCurveTable;
use crate::error::{ConfigurationError, DataError};
use crate::fit::{BandSelection, ColorFitResult, ParallelFitResult, SeriesFitResult};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Light curves of all images of a single lensed transient together with the attached fit
/// results
///
/// Images are kept in name order. Time delays and magnifications are measured relative to the
/// reference image, the first image by default.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultiImageLightCurve {
    pub images: BTreeMap<String, LightCurveTable>,
    pub reference: String,
    /// Model parameters fixed for this object, e.g. known redshift
    pub constants: BTreeMap<String, f64>,
    pub parallel: Option<ParallelFitResult>,
    pub series: Option<SeriesFitResult>,
    pub color: Option<ColorFitResult>,
    pub band_selection: Option<BandSelection>,
}

impl MultiImageLightCurve {
    pub fn new(
        images: impl IntoIterator<Item = (String, LightCurveTable)>,
    ) -> Result<Self, DataError> {
        let images: BTreeMap<_, _> = images.into_iter().collect();
        let reference = images.keys().next().ok_or(DataError::EmptyTable)?.clone();
        if images.values().any(LightCurveTable::is_empty) {
            return Err(DataError::EmptyTable);
        }
        Ok(Self {
            images,
            reference,
            constants: BTreeMap::new(),
            parallel: None,
            series: None,
            color: None,
            band_selection: None,
        })
    }

    pub fn with_reference(mut self, reference: &str) -> Result<Self, ConfigurationError> {
        self.check_image(reference)?;
        self.reference = reference.to_owned();
        Ok(self)
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn image(&self, name: &str) -> Result<&LightCurveTable, ConfigurationError> {
        self.images
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownImage {
                image: name.to_owned(),
            })
    }

    pub(crate) fn check_image(&self, name: &str) -> Result<(), ConfigurationError> {
        self.image(name).map(|_| ())
    }

    #[inline]
    pub fn n_images(&self) -> usize {
        self.images.len()
    }

    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    /// Names of all images but the reference one
    pub fn others(&self) -> impl Iterator<Item = &str> {
        self.image_names().filter(move |&name| name != self.reference)
    }

    /// Union of the bands of all images
    pub fn bands(&self) -> BTreeSet<String> {
        self.images.values().flat_map(|t| t.bands()).collect()
    }

    /// Bands having at least `min_points` observations in every image
    pub fn common_bands(&self, min_points: usize) -> BTreeSet<String> {
        self.bands()
            .into_iter()
            .filter(|band| {
                self.images
                    .values()
                    .all(|table| table.band_count(band) >= min_points)
            })
            .collect()
    }

    /// Copy with every image restricted to `bands`, results are not copied
    pub fn restricted_to(&self, bands: &BTreeSet<String>) -> Result<Self, DataError> {
        let images = self
            .images
            .iter()
            .map(|(name, table)| {
                let table = table.with_bands(bands);
                if table.is_empty() {
                    Err(DataError::NoValidCandidates("bands"))
                } else {
                    Ok((name.clone(), table))
                }
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self {
            images,
            reference: self.reference.clone(),
            constants: self.constants.clone(),
            parallel: None,
            series: None,
            color: None,
            band_selection: None,
        })
    }

    /// Image names in descending order of total signal-to-noise
    pub fn by_signal_to_noise(&self) -> Vec<String> {
        let mut names: Vec<(f64, &String)> = self
            .images
            .iter()
            .map(|(name, table)| (table.signal_to_noise(), name))
            .collect();
        names.sort_by(|a, b| b.0.total_cmp(&a.0));
        names.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Two bands with the highest `sum(flux / fluxerr) * sqrt(n)` summed over images
    pub fn best_band_pair(&self) -> Result<(String, String), ConfigurationError> {
        let bands = self.bands();
        if bands.len() < 2 {
            return Err(ConfigurationError::TooFewBands {
                actual: bands.len(),
            });
        }
        let mut ranked: Vec<(f64, String)> = bands
            .into_iter()
            .map(|band| {
                let snr = self
                    .images
                    .values()
                    .map(|t| t.band_signal_to_noise(&band))
                    .sum();
                (snr, band)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut ranked = ranked.into_iter().map(|(_, band)| band);
        match (ranked.next(), ranked.next()) {
            (Some(first), Some(second)) => Ok((first, second)),
            _ => Err(ConfigurationError::TooFewBands { actual: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(bands: &[&str], flux: f64) -> LightCurveTable {
        let n = bands.len();
        LightCurveTable::new(
            (0..n).map(|i| i as f64).collect::<Vec<_>>(),
            bands.iter().map(|&b| b.to_owned()).collect(),
            vec![flux; n],
            vec![1.0; n],
            vec![25.0; n],
            vec!["ab".to_owned(); n],
        )
        .unwrap()
    }

    fn curves() -> MultiImageLightCurve {
        MultiImageLightCurve::new([
            ("image_1".to_owned(), table(&["g", "g", "g", "r", "r", "i"], 10.0)),
            ("image_2".to_owned(), table(&["g", "g", "g", "r", "r", "r"], 20.0)),
        ])
        .unwrap()
    }

    #[test]
    fn reference_defaults_to_first_image() {
        let c = curves();
        assert_eq!(c.reference, "image_1");
        assert_eq!(c.others().collect::<Vec<_>>(), vec!["image_2"]);
        let c = c.with_reference("image_2").unwrap();
        assert_eq!(c.others().collect::<Vec<_>>(), vec!["image_1"]);
        assert!(curves().with_reference("image_3").is_err());
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            MultiImageLightCurve::new(Vec::<(String, LightCurveTable)>::new()),
            Err(DataError::EmptyTable)
        );
    }

    #[test]
    fn common_bands() {
        let c = curves();
        let common = c.common_bands(2);
        assert_eq!(common.into_iter().collect::<Vec<_>>(), vec!["g", "r"]);
        let common = c.common_bands(3);
        assert_eq!(common.into_iter().collect::<Vec<_>>(), vec!["g"]);
    }

    #[test]
    fn signal_to_noise_order() {
        assert_eq!(curves().by_signal_to_noise(), vec!["image_2", "image_1"]);
    }

    #[test]
    fn best_band_pair() {
        let (first, second) = curves().best_band_pair().unwrap();
        assert_eq!((first.as_str(), second.as_str()), ("g", "r"));
        let single = curves()
            .restricted_to(&BTreeSet::from(["g".to_owned()]))
            .unwrap();
        assert_eq!(
            single.best_band_pair(),
            Err(ConfigurationError::TooFewBands { actual: 1 })
        );
    }
}
