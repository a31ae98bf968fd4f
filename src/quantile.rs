use ndarray::ArrayView1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum QuantileError {
    #[error("no finite samples to compute quantiles of")]
    Empty,

    #[error("samples and weights have different lengths: {samples} and {weights}")]
    LengthMismatch { samples: usize, weights: usize },

    #[error("quantile should be between zero and unity")]
    OutOfRange,
}

/// Weighted empirical quantiles
///
/// Samples are sorted together with their weights, each sample is placed at the middle of its
/// weight bin of the normalized cumulative weight curve, and every requested quantile is linearly
/// interpolated between the two bracketing samples. Quantiles outside the curve are clamped to the
/// extreme samples. Weights need not be normalized, only their ratios matter.
///
/// Non-finite samples and non-positive weights are ignored. If the total weight vanishes the
/// quantiles of the unweighted sample are returned by nearest rank.
pub fn weighted_quantile(
    samples: ArrayView1<f64>,
    quantiles: &[f64],
    weights: ArrayView1<f64>,
) -> Result<Vec<f64>, QuantileError> {
    if samples.len() != weights.len() {
        return Err(QuantileError::LengthMismatch {
            samples: samples.len(),
            weights: weights.len(),
        });
    }
    if quantiles.iter().any(|q| !(0.0..=1.0).contains(q)) {
        return Err(QuantileError::OutOfRange);
    }

    let mut pairs: Vec<(f64, f64)> = samples
        .iter()
        .zip(weights.iter())
        .filter(|(x, _)| x.is_finite())
        .map(|(&x, &w)| (x, if w.is_finite() && w > 0.0 { w } else { 0.0 }))
        .collect();
    if pairs.is_empty() {
        return Err(QuantileError::Empty);
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if !(total > 0.0) || !total.is_finite() {
        return Ok(quantiles
            .iter()
            .map(|&q| nearest_rank(&pairs, q))
            .collect());
    }

    // Zero-weight samples would make flat steps of the cumulative curve
    let (x, cdf): (Vec<f64>, Vec<f64>) = {
        let mut cumulative = 0.0;
        pairs
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|&(x, w)| {
                cumulative += w;
                (x, (cumulative - 0.5 * w) / total)
            })
            .unzip()
    };

    Ok(quantiles.iter().map(|&q| interpolate(&x, &cdf, q)).collect())
}

fn nearest_rank(sorted: &[(f64, f64)], q: f64) -> f64 {
    let i = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[i.min(sorted.len() - 1)].0
}

fn interpolate(x: &[f64], cdf: &[f64], q: f64) -> f64 {
    if q <= cdf[0] {
        return x[0];
    }
    let last = cdf.len() - 1;
    if q >= cdf[last] {
        return x[last];
    }
    let i = cdf.partition_point(|&c| c <= q);
    let (c0, c1) = (cdf[i - 1], cdf[i]);
    let span = c1 - c0;
    if span <= 0.0 {
        return if q - c0 <= c1 - q { x[i - 1] } else { x[i] };
    }
    x[i - 1] + (q - c0) / span * (x[i] - x[i - 1])
}

/// Median and 1-sigma credible interval of a marginal posterior
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Quantiles {
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

impl Quantiles {
    pub const LEVELS: [f64; 3] = [0.16, 0.5, 0.84];

    pub fn new(lower: f64, median: f64, upper: f64) -> Self {
        Self {
            lower,
            median,
            upper,
        }
    }

    /// A point estimate with no spread
    pub fn exact(value: f64) -> Self {
        Self::new(value, value, value)
    }

    pub fn from_weighted(
        samples: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<Self, QuantileError> {
        let q = weighted_quantile(samples, &Self::LEVELS, weights)?;
        Ok(Self::new(q[0], q[1], q[2]))
    }

    /// Asymmetric error bars `[q16 - q50, q84 - q50]`
    pub fn errors(&self) -> [f64; 2] {
        [self.lower - self.median, self.upper - self.median]
    }

    /// Half width of the 16-84 interval
    pub fn sigma(&self) -> f64 {
        0.5 * (self.upper - self.lower)
    }

    pub fn contains(&self, x: f64) -> bool {
        (self.lower..=self.upper).contains(&x)
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self::new(self.lower + offset, self.median + offset, self.upper + offset)
    }

    /// Multiply by a positive factor
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.lower * factor, self.median * factor, self.upper * factor)
    }

    /// `median + factor * [q16 - q50, q84 - q50]`, the interval widened around the median
    pub fn widened(&self, factor: f64) -> (f64, f64) {
        let [lower, upper] = self.errors();
        (self.median + factor * lower, self.median + factor * upper)
    }
}
