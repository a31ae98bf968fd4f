use crate::data::{ColorTable, CombinedLightCurve};
use crate::micro::MicrolensingSummary;
use crate::model::ModelState;
use crate::nest::FitResult;
use crate::quantile::Quantiles;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Independent fit of a single image
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageFit {
    /// Model with the best-fit parameters
    pub model: ModelState,
    pub result: FitResult,
    /// 16/50/84 percentiles of every sampled parameter
    pub param_quantiles: BTreeMap<String, Quantiles>,
    pub micro: Option<MicrolensingSummary>,
}

/// Output of [ParallelFitter](crate::ParallelFitter)
///
/// Delays and magnifications are relative to `reference`, which has exactly zero and unity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParallelFitResult {
    pub reference: String,
    /// Images in the order they were fitted, the first one provides the priors of the others
    pub fit_order: Vec<String>,
    pub images: BTreeMap<String, ImageFit>,
    pub time_delays: BTreeMap<String, Quantiles>,
    pub magnifications: BTreeMap<String, Quantiles>,
}

impl ParallelFitResult {
    pub fn model_name(&self) -> Option<&str> {
        self.images
            .values()
            .next()
            .map(|fit| fit.model.model_name.as_str())
    }
}

/// Output of [SeriesFitter](crate::SeriesFitter)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeriesFitResult {
    pub reference: String,
    /// Best-fit model of the reference image
    pub model: ModelState,
    pub result: FitResult,
    pub param_quantiles: BTreeMap<String, Quantiles>,
    pub time_delays: BTreeMap<String, Quantiles>,
    pub magnifications: BTreeMap<String, Quantiles>,
    /// Observer-frame peak time of every image
    pub t_peaks: BTreeMap<String, f64>,
    /// Peak amplitude of every image
    pub a_peaks: BTreeMap<String, f64>,
    /// Shifts the images were aligned with before the fit, the nuisance parameters are relative
    /// to them
    pub initial_delays: BTreeMap<String, f64>,
    pub initial_magnifications: BTreeMap<String, f64>,
    /// All images moved to the reference frame with the fitted delays and magnifications
    pub combined: CombinedLightCurve,
    pub micro: Option<MicrolensingSummary>,
}

/// Output of [ColorFitter](crate::ColorFitter)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColorFitResult {
    pub reference: String,
    pub bands: (String, String),
    pub model: ModelState,
    pub result: FitResult,
    pub param_quantiles: BTreeMap<String, Quantiles>,
    pub time_delays: BTreeMap<String, Quantiles>,
    pub t_peaks: BTreeMap<String, f64>,
    pub initial_delays: BTreeMap<String, f64>,
    /// Color curve of all images shifted with the fitted delays
    pub colors: ColorTable,
}

/// Evidence of a color fit with a single band pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BandPairEvidence {
    pub bands: (String, String),
    pub logz: f64,
    /// See [FitResult::evidence_error]
    pub logz_err: f64,
}

/// Output of [select_bands](crate::select_bands)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BandSelection {
    /// Pair of the highest evidence
    pub color_bands: (String, String),
    /// Bands of all pairs with evidence compatible with the best one
    pub safe_bands: BTreeSet<String>,
    /// Every successfully fitted pair, in fit order
    pub pairs: Vec<BandPairEvidence>,
}
