use crate::data::MultiImageLightCurve;
use crate::error::FitFailure;
use crate::fit::{FitConfig, FitMethod, fit_methods};
use crate::model::PhotometricModel;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{info, warn};

/// Fitted light curve or the failure of the light curve at `index` of a batch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchItem {
    pub index: usize,
    pub result: Result<MultiImageLightCurve, FitFailure>,
}

/// Split `0..n_items` into at most `n_jobs` contiguous ranges of nearly equal length
///
/// Longer ranges come first. Empty ranges are never returned.
pub fn partition(n_items: usize, n_jobs: usize) -> Vec<Range<usize>> {
    let n_jobs = n_jobs.clamp(1, n_items.max(1));
    let (size, rest) = (n_items / n_jobs, n_items % n_jobs);
    let mut start = 0;
    (0..n_jobs)
        .map(|job| {
            let len = size + usize::from(job < rest);
            let range = start..start + len;
            start += len;
            range
        })
        .filter(|range| !range.is_empty())
        .collect()
}

/// Fit every light curve of a batch with [fit_methods], in parallel
///
/// A failing light curve doesn't affect the others, its error is kept in the returned item.
pub fn fit_batch<M: PhotometricModel>(
    curves: &[MultiImageLightCurve],
    models: &[M],
    config: &FitConfig,
    methods: &[FitMethod],
    chain_prior: bool,
) -> Vec<BatchItem> {
    info!(n_items = curves.len(), ?methods, "batch fit started");
    let items: Vec<BatchItem> = curves
        .par_iter()
        .enumerate()
        .map(|(index, curves)| {
            let result = fit_methods(curves, models, config, methods, chain_prior).map_err(
                |error| {
                    warn!(index, %error, "batch item failed");
                    FitFailure {
                        index,
                        message: error.to_string(),
                    }
                },
            );
            BatchItem { index, result }
        })
        .collect();
    let n_failed = items.iter().filter(|item| item.result.is_err()).count();
    info!(n_items = items.len(), n_failed, "batch fit finished");
    items
}

/// Put batch items back in index order, failed and missing items become `None`
///
/// Items with an index outside of `0..n_items` are dropped.
pub fn reassemble(
    n_items: usize,
    items: impl IntoIterator<Item = BatchItem>,
) -> Vec<Option<MultiImageLightCurve>> {
    let mut output = vec![None; n_items];
    for BatchItem { index, result } in items {
        match output.get_mut(index) {
            Some(slot) => *slot = result.ok(),
            None => warn!(index, n_items, "batch item out of range dropped"),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BazinModel;
    use crate::nest::SamplerConfig;
    use crate::tests::*;

    #[test]
    fn partition_covers_all_items() {
        assert_eq!(partition(10, 3), [0..4, 4..7, 7..10]);
        assert_eq!(partition(2, 5), [0..1, 1..2]);
        assert_eq!(partition(4, 0), [0..4]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn reassemble_restores_order() {
        let (curves, _) = lensed_pair(51, &["r"], 10.0, 2.0);
        let items = vec![
            BatchItem {
                index: 2,
                result: Ok(curves.clone()),
            },
            BatchItem {
                index: 0,
                result: Err(FitFailure {
                    index: 0,
                    message: "no valid models left to fit".to_owned(),
                }),
            },
            BatchItem {
                index: 7,
                result: Ok(curves.clone()),
            },
        ];
        let output = reassemble(3, items);
        assert_eq!(output, [None, None, Some(curves)]);
    }

    #[test]
    fn failure_does_not_abort_siblings() {
        let (good, _) = lensed_pair(52, &["g", "r"], 10.0, 2.0);
        let (mut bad, _) = lensed_pair(53, &["g", "r"], 10.0, 2.0);
        for table in bad.images.values_mut() {
            table.flux.fill(-1.0);
        }
        let config = fit_config(SamplerConfig::default().with_seed(Some(11)));
        let items = fit_batch(
            &[bad, good],
            &[BazinModel::default()],
            &config,
            &[FitMethod::Parallel],
            false,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 0);
        assert!(items[0].result.is_err());
        let fitted = items[1].result.as_ref().unwrap();
        assert!(fitted.parallel.is_some());

        let output = reassemble(2, items);
        assert!(output[0].is_none() && output[1].is_some());
    }
}
