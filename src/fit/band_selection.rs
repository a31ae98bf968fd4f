use crate::data::MultiImageLightCurve;
use crate::error::{ConfigurationError, DataError, FitError};
use crate::fit::{BandPairEvidence, BandSelection, ColorFitter, FitConfig, usable_bands};
use crate::model::PhotometricModel;

use itertools::Itertools;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Number of evidence standard errors for a band pair to be compatible with the best one
const EVIDENCE_SIGMA: f64 = 3.0;

/// Find the color band pair of the highest evidence and the bands agreeing with it
///
/// Every pair of the bands having enough points in all images is fitted by [ColorFitter] with
/// [FitConfig::band_selection_npoints] live points, pairs run in parallel. Pairs which fail to
/// fit are skipped. A band is safe if it belongs to a pair whose evidence is within three
/// standard errors of the best pair. A band corrupted in some image spoils the evidence of every
/// pair it takes part in, so it drops out of the safe set.
pub fn select_bands<M: PhotometricModel>(
    curves: &MultiImageLightCurve,
    models: &[M],
    config: &FitConfig,
) -> Result<BandSelection, FitError> {
    let curves = usable_bands(curves, config)?;
    let bands = curves.bands();
    if bands.len() < 2 {
        return Err(ConfigurationError::TooFewBands {
            actual: bands.len(),
        }
        .into());
    }
    let pairs: Vec<(String, String)> = bands.iter().cloned().tuple_combinations().collect();
    info!(n_pairs = pairs.len(), "band selection started");

    let fits: Vec<_> = pairs
        .into_par_iter()
        .map(|(first, second)| {
            let pair_config = FitConfig {
                bands: Some(BTreeSet::from([first.clone(), second.clone()])),
                color_bands: Some((first.clone(), second.clone())),
                sampler: config
                    .sampler
                    .clone()
                    .with_npoints(config.band_selection_npoints),
                microlensing: None,
                select_bands: false,
                ..config.clone()
            };
            let fit = ColorFitter::new(models, &pair_config).fit(&curves, None);
            ((first, second), fit)
        })
        .collect();

    let mut evidences = vec![];
    for (bands, fit) in fits {
        match fit {
            Ok(fit) => {
                let evidence = BandPairEvidence {
                    bands,
                    logz: fit.result.logz,
                    logz_err: fit.result.evidence_error(),
                };
                debug!(
                    bands = ?evidence.bands,
                    logz = evidence.logz,
                    logz_err = evidence.logz_err,
                    "band pair fitted"
                );
                evidences.push(evidence);
            }
            Err(error) if error.is_skippable() => {
                warn!(?bands, %error, "band pair skipped");
            }
            Err(error) => return Err(error),
        }
    }
    let selection = selection(evidences)?;
    info!(
        color_bands = ?selection.color_bands,
        safe_bands = ?selection.safe_bands,
        "band selection finished"
    );
    Ok(selection)
}

fn selection(pairs: Vec<BandPairEvidence>) -> Result<BandSelection, FitError> {
    let best = pairs
        .iter()
        .max_by(|a, b| a.logz.total_cmp(&b.logz))
        .ok_or(DataError::NoValidCandidates("band pairs"))?;
    let threshold = best.logz - EVIDENCE_SIGMA * best.logz_err;
    let safe_bands = pairs
        .iter()
        .filter(|pair| pair.logz + EVIDENCE_SIGMA * pair.logz_err >= threshold)
        .flat_map(|pair| [pair.bands.0.clone(), pair.bands.1.clone()])
        .collect();
    Ok(BandSelection {
        color_bands: best.bands.clone(),
        safe_bands,
        pairs,
    })
}
