use crate::data::LightCurveTable;
use crate::model::PhotometricModel;

use ndarray::Array2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const Z: usize = 0;
const T0: usize = 1;
const AMPLITUDE: usize = 2;
const RISE: usize = 3;
const FALL: usize = 4;

const PARAM_NAMES: [&str; 5] = ["z", "t0", "amplitude", "rise", "fall"];

/// Relative shape of the light curve in a passband
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BandShape {
    /// Flux relative to the model amplitude
    pub flux_scale: f64,
    /// Multiplier of the rise time
    pub rise_scale: f64,
    /// Multiplier of the fall time
    pub fall_scale: f64,
}

impl BandShape {
    pub fn new(flux_scale: f64, rise_scale: f64, fall_scale: f64) -> Self {
        Self {
            flux_scale,
            rise_scale,
            fall_scale,
        }
    }
}

/// Multi-band Bazin light curve
///
/// $$
/// f_b(t) = A s_b \frac{\mathrm{e}^{-\phi/(\tau_\mathrm{fall} k_b)}}{1 + \mathrm{e}^{-\phi/(\tau_\mathrm{rise} r_b)}},
/// \quad \phi = \frac{t - t_0}{1 + z},
/// $$
///
/// where $s_b$, $r_b$ and $k_b$ are the [BandShape] of band $b$. Amplitude is the flux for the
/// zero point 25, fluxes for other zero points are rescaled. Parameters are
/// `z`, `t0`, `amplitude`, `rise`, `fall`. Band-dependent rise and fall times make the color
/// curve evolve, so it carries information on `t0` independently of the amplitude.
///
/// Flux in a band unknown to the model is NaN.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BazinModel {
    param_names: Vec<String>,
    parameters: Vec<f64>,
    bands: BTreeMap<String, BandShape>,
    phase_range: (f64, f64),
    model_error_fraction: Option<f64>,
}

impl BazinModel {
    pub fn new(bands: impl IntoIterator<Item = (String, BandShape)>) -> Self {
        Self {
            param_names: PARAM_NAMES.iter().map(|&s| s.to_owned()).collect(),
            parameters: vec![0.0, 0.0, 1.0, 3.0, 20.0],
            bands: bands.into_iter().collect(),
            phase_range: Self::default_phase_range(),
            model_error_fraction: None,
        }
    }

    /// g, r and i bands with a redder-is-slower shape
    pub fn default_bands() -> Vec<(String, BandShape)> {
        vec![
            ("g".to_owned(), BandShape::new(1.0, 0.8, 0.7)),
            ("r".to_owned(), BandShape::new(0.9, 1.0, 1.0)),
            ("i".to_owned(), BandShape::new(0.7, 1.3, 1.4)),
        ]
    }

    /// Rest-frame phase interval where the model is defined
    #[inline]
    pub fn default_phase_range() -> (f64, f64) {
        (-50.0, 150.0)
    }

    pub fn with_phase_range(mut self, lower: f64, upper: f64) -> Self {
        self.phase_range = (lower, upper);
        self
    }

    /// Add a model flux uncertainty equal to `fraction` of the model flux
    pub fn with_model_error(mut self, fraction: f64) -> Self {
        self.model_error_fraction = Some(fraction);
        self
    }

    pub fn bands(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    fn zp25_flux(&self, params: &[f64], band: &str, time: f64) -> f64 {
        let Some(shape) = self.bands.get(band) else {
            return f64::NAN;
        };
        let phase = (time - params[T0]) / (1.0 + params[Z]);
        let rise = params[RISE] * shape.rise_scale;
        let fall = params[FALL] * shape.fall_scale;
        params[AMPLITUDE] * shape.flux_scale * f64::exp(-phase / fall)
            / (1.0 + f64::exp(-phase / rise))
    }
}

impl Default for BazinModel {
    fn default() -> Self {
        Self::new(Self::default_bands())
    }
}

impl PhotometricModel for BazinModel {
    fn name(&self) -> &str {
        "bazin"
    }

    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.parameters
    }

    fn amplitude_name(&self) -> &str {
        PARAM_NAMES[AMPLITUDE]
    }

    fn bandflux(&self, params: &[f64], band: &str, time: f64, zp: f64, _zpsys: &str) -> f64 {
        self.zp25_flux(params, band, time) * f64::powf(10.0, 0.4 * (zp - 25.0))
    }

    fn time_domain(&self, params: &[f64]) -> (f64, f64) {
        let stretch = 1.0 + params[Z];
        (
            params[T0] + self.phase_range.0 * stretch,
            params[T0] + self.phase_range.1 * stretch,
        )
    }

    fn bandflux_covariance(&self, params: &[f64], data: &LightCurveTable) -> Option<Array2<f64>> {
        let fraction = self.model_error_fraction?;
        let variance = (0..data.len())
            .map(|i| {
                let flux = self.bandflux(params, &data.band[i], data.time[i], data.zp[i], &data.zpsys[i]);
                (fraction * flux).powi(2)
            })
            .collect::<ndarray::Array1<f64>>();
        Some(Array2::from_diag(&variance))
    }
}
