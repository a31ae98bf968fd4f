use crate::data::LightCurveTable;
use crate::error::{ConfigurationError, DataError, FitError};
use crate::model::PhotometricModel;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Number of model evaluations per band used to locate the model peak
const GRID_SIZE: usize = 1000;

/// Rough time of peak and amplitude of a light curve
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PeakGuess {
    pub t0: f64,
    pub amplitude: f64,
}

/// Guess the peak time and amplitude by matching data maxima to model maxima
///
/// Only observations with `flux / fluxerr > min_snr` are used, or all of them if there are none.
/// For every band the brightest observation is compared to the peak of the model evaluated at
/// zero peak time and unit amplitude. The time of peak comes from the band with the most
/// significant maximum, the amplitude is the largest data-to-model ratio.
pub fn guess_t0_and_amplitude<M: PhotometricModel>(
    model: &M,
    data: &LightCurveTable,
    min_snr: f64,
) -> Result<PeakGuess, FitError> {
    let mut params = model.parameters().to_vec();
    for name in [model.t0_name(), model.amplitude_name()] {
        let i = model
            .param_index(name)
            .ok_or_else(|| ConfigurationError::UnknownParameter {
                param: name.to_owned(),
            })?;
        params[i] = if name == model.amplitude_name() { 1.0 } else { 0.0 };
    }

    let significant = data.select(|i| data.flux[i] / data.fluxerr[i] > min_snr);
    let data = if significant.is_empty() {
        data
    } else {
        &significant
    };

    let (t_min, t_max) = model.time_domain(&params);
    let grid = Array1::linspace(t_min, t_max, GRID_SIZE);

    // (significance, t0) of the most significant maximum
    let mut best_t0: Option<(f64, f64)> = None;
    let mut amplitude = f64::NEG_INFINITY;
    for band in data.bands() {
        let Some(i) = (0..data.len())
            .filter(|&i| data.band[i] == band && data.flux[i] > 0.0)
            .max_by(|&a, &b| data.flux[a].total_cmp(&data.flux[b]))
        else {
            continue;
        };
        let Some((t_model, model_max)) = grid
            .iter()
            .map(|&t| (t, model.bandflux(&params, &band, t, data.zp[i], &data.zpsys[i])))
            .filter(|(_, flux)| flux.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if !(model_max > 0.0) {
            continue;
        }
        amplitude = amplitude.max(data.flux[i] / model_max);
        let significance = data.flux[i] / data.fluxerr[i];
        if best_t0.is_none_or(|(s, _)| significance > s) {
            best_t0 = Some((significance, data.time[i] - t_model));
        }
    }

    match best_t0 {
        Some((_, t0)) if amplitude.is_finite() => Ok(PeakGuess { t0, amplitude }),
        _ => Err(DataError::NoPositiveFlux("peak guess").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BazinModel;
    use crate::tests::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_noiseless_peak() {
        let mut model = BazinModel::default();
        model.set("t0", 57.0).unwrap();
        model.set("amplitude", 300.0).unwrap();
        let data = noiseless_table(&model, &["g", "r"], 0.0, 150.0, 1.0);
        let guess = guess_t0_and_amplitude(&BazinModel::default(), &data, 5.0).unwrap();
        assert_abs_diff_eq!(guess.t0, 57.0, epsilon = 0.6);
        assert_abs_diff_eq!(guess.amplitude, 300.0, epsilon = 3.0);
    }

    #[test]
    fn negative_flux_only() {
        let model = BazinModel::default();
        let mut data = noiseless_table(&model, &["r"], 0.0, 50.0, 5.0);
        data.flux.fill(-1.0);
        assert_eq!(
            guess_t0_and_amplitude(&model, &data, 5.0),
            Err(FitError::Data(DataError::NoPositiveFlux("peak guess")))
        );
    }

    #[test]
    fn low_signal_to_noise_falls_back_to_all_points() {
        let mut model = BazinModel::default();
        model.set("t0", 20.0).unwrap();
        model.set("amplitude", 3.0).unwrap();
        let mut data = noiseless_table(&model, &["r"], 0.0, 100.0, 1.0);
        data.fluxerr.fill(10.0);
        let guess = guess_t0_and_amplitude(&model, &data, 5.0).unwrap();
        assert_abs_diff_eq!(guess.t0, 20.0, epsilon = 0.6);
    }
}
