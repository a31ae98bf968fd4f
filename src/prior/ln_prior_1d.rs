use crate::error::NumericalError;

use enum_dispatch::enum_dispatch;
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt::Debug;
use std::hash::Hash;

#[enum_dispatch]
pub trait LnPrior1DTrait:
    Clone + Debug + Serialize + DeserializeOwned + PartialEq + Eq + Hash
{
    /// Natural logarithm of the prior density at x
    fn ln_prior_1d(&self, x: f64) -> f64;

    /// Unnormalized prior density at x
    fn density(&self, x: f64) -> f64 {
        f64::exp(self.ln_prior_1d(x))
    }
}

/// Natural logarithm of prior density of a single sampled parameter
///
/// A density is always combined with parameter bounds: the sampler draws from the density
/// truncated to the bounds, see [InverseCdf](crate::prior::InverseCdf).
#[enum_dispatch(LnPrior1DTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LnPrior1D {
    None(NoneLnPrior1D),
    LogNormal(LogNormalLnPrior1D),
    LogUniform(LogUniformLnPrior1D),
    Normal(NormalLnPrior1D),
    Uniform(UniformLnPrior1D),
    Mix(MixLnPrior1D),
    Empirical(EmpiricalLnPrior1D),
}

impl LnPrior1D {
    /// Flat density, i.e. uniform within parameter bounds
    pub fn none() -> Self {
        NoneLnPrior1D {}.into()
    }

    pub fn log_normal(mu: f64, std: f64) -> Self {
        LogNormalLnPrior1D::new(mu, std).into()
    }

    pub fn log_uniform(left: f64, right: f64) -> Self {
        LogUniformLnPrior1D::new(left, right).into()
    }

    pub fn normal(mu: f64, std: f64) -> Self {
        NormalLnPrior1D::new(mu, std).into()
    }

    pub fn uniform(left: f64, right: f64) -> Self {
        UniformLnPrior1D::new(left, right).into()
    }

    pub fn mix(weight_prior_pairs: &[(f64, LnPrior1D)]) -> Self {
        MixLnPrior1D::new(weight_prior_pairs).into()
    }

    /// Smoothed density of weighted posterior samples
    pub fn empirical(samples: &[f64], weights: &[f64]) -> Result<Self, NumericalError> {
        Ok(EmpiricalLnPrior1D::new(samples, weights)?.into())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct NoneLnPrior1D {}

impl LnPrior1DTrait for NoneLnPrior1D {
    fn ln_prior_1d(&self, _x: f64) -> f64 {
        0.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(
    into = "GaussianLnPrior1DParameters",
    from = "GaussianLnPrior1DParameters"
)]
pub struct LogNormalLnPrior1D(GaussianKernel);

impl LogNormalLnPrior1D {
    /// # Panics
    /// If `mu` is NaN or `std` is not positive
    pub fn new(mu: f64, std: f64) -> Self {
        Self(GaussianKernel::new(mu, std))
    }
}

impl LnPrior1DTrait for LogNormalLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        let ln_x = f64::ln(x);
        self.0.ln_pdf(ln_x) - ln_x
    }
}

impl From<LogNormalLnPrior1D> for GaussianLnPrior1DParameters {
    fn from(f: LogNormalLnPrior1D) -> Self {
        f.0.into()
    }
}

impl From<GaussianLnPrior1DParameters> for LogNormalLnPrior1D {
    fn from(f: GaussianLnPrior1DParameters) -> Self {
        Self::new(f.mu, f.std)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(into = "RangeLnPrior1DParameters", from = "RangeLnPrior1DParameters")]
pub struct LogUniformLnPrior1D {
    range: std::ops::RangeInclusive<NotNan<f64>>,
    ln_prob_coeff: NotNan<f64>,
}

impl LogUniformLnPrior1D {
    /// # Panics
    /// Unless `0 < left < right < inf`
    pub fn new(left: f64, right: f64) -> Self {
        assert!(0.0 < left && left < right && right.is_finite());
        Self {
            ln_prob_coeff: NotNan::new(-f64::ln(f64::ln(right / left)))
                .expect("right must be larger than left"),
            range: NotNan::new(left).expect("left must be positive and finite")
                ..=NotNan::new(right).expect("right must be positive and finite"),
        }
    }
}

impl LnPrior1DTrait for LogUniformLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        match NotNan::new(x) {
            Ok(x) if self.range.contains(&x) => *self.ln_prob_coeff - f64::ln(*x),
            _ => f64::NEG_INFINITY,
        }
    }
}

impl From<LogUniformLnPrior1D> for RangeLnPrior1DParameters {
    fn from(f: LogUniformLnPrior1D) -> Self {
        Self {
            range: **f.range.start()..=**f.range.end(),
        }
    }
}

impl From<RangeLnPrior1DParameters> for LogUniformLnPrior1D {
    fn from(f: RangeLnPrior1DParameters) -> Self {
        Self::new(*f.range.start(), *f.range.end())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(
    into = "GaussianLnPrior1DParameters",
    from = "GaussianLnPrior1DParameters"
)]
pub struct NormalLnPrior1D(GaussianKernel);

impl NormalLnPrior1D {
    /// # Panics
    /// If `mu` is NaN or `std` is not positive
    pub fn new(mu: f64, std: f64) -> Self {
        Self(GaussianKernel::new(mu, std))
    }
}

impl LnPrior1DTrait for NormalLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        self.0.ln_pdf(x)
    }
}

impl From<NormalLnPrior1D> for GaussianLnPrior1DParameters {
    fn from(f: NormalLnPrior1D) -> Self {
        f.0.into()
    }
}

impl From<GaussianLnPrior1DParameters> for NormalLnPrior1D {
    fn from(f: GaussianLnPrior1DParameters) -> Self {
        Self::new(f.mu, f.std)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(into = "RangeLnPrior1DParameters", from = "RangeLnPrior1DParameters")]
pub struct UniformLnPrior1D {
    range: std::ops::RangeInclusive<NotNan<f64>>,
    ln_prob: NotNan<f64>,
}

impl UniformLnPrior1D {
    /// # Panics
    /// Unless `left < right` and both are finite
    pub fn new(left: f64, right: f64) -> Self {
        assert!(left < right && left.is_finite() && right.is_finite());
        let left = NotNan::new(left).expect("left must be finite");
        let right = NotNan::new(right).expect("right must be finite");
        Self {
            ln_prob: NotNan::new(-f64::ln(*right - *left)).expect("right must be larger than left"),
            range: left..=right,
        }
    }
}

impl LnPrior1DTrait for UniformLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        match NotNan::new(x) {
            Ok(x) if self.range.contains(&x) => *self.ln_prob,
            _ => f64::NEG_INFINITY,
        }
    }
}

impl From<UniformLnPrior1D> for RangeLnPrior1DParameters {
    fn from(f: UniformLnPrior1D) -> Self {
        Self {
            range: **f.range.start()..=**f.range.end(),
        }
    }
}

impl From<RangeLnPrior1DParameters> for UniformLnPrior1D {
    fn from(f: RangeLnPrior1DParameters) -> Self {
        Self::new(*f.range.start(), *f.range.end())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct MixLnPrior1D {
    mix: Vec<(NotNan<f64>, LnPrior1D)>,
}

impl MixLnPrior1D {
    /// Create MixLnPrior1D from pairs of a weight (positive number) and an instance of `LnPrior1D`
    pub fn new(weight_prior_pairs: &[(f64, LnPrior1D)]) -> Self {
        let total_weight: f64 = weight_prior_pairs.iter().map(|(weight, _)| *weight).sum();
        let mix = weight_prior_pairs
            .iter()
            .map(|(weight, prior)| {
                assert!(*weight > 0.0, "weights must be positive and finite");
                (
                    NotNan::new(*weight / total_weight)
                        .expect("weights must be positive and finite"),
                    prior.clone(),
                )
            })
            .collect();
        Self { mix }
    }
}

impl LnPrior1DTrait for MixLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        f64::ln(self.density(x))
    }

    fn density(&self, x: f64) -> f64 {
        self.mix
            .iter()
            .map(|(weight, prior)| **weight * prior.density(x))
            .sum()
    }
}

/// Weighted Gaussian kernel density estimate
///
/// The bandwidth follows Scott's rule with the effective sample size of the weights,
/// $h = \sigma_w n_\mathrm{eff}^{-1/5}$, $n_\mathrm{eff} = (\sum w)^2 / \sum w^2$.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct EmpiricalLnPrior1D {
    samples: Vec<NotNan<f64>>,
    weights: Vec<NotNan<f64>>,
    bandwidth: NotNan<f64>,
}

impl EmpiricalLnPrior1D {
    pub fn new(samples: &[f64], weights: &[f64]) -> Result<Self, NumericalError> {
        let (samples, weights): (Vec<_>, Vec<_>) = samples
            .iter()
            .zip(weights.iter())
            .filter(|(x, w)| x.is_finite() && w.is_finite() && **w > 0.0)
            .filter_map(|(&x, &w)| Some((NotNan::new(x).ok()?, w)))
            .unzip();
        let total: f64 = weights.iter().sum();
        if samples.is_empty() || !(total > 0.0) {
            return Err(NumericalError::DegeneratePosterior);
        }
        let weights: Vec<f64> = weights.into_iter().map(|w| w / total).collect();

        let mean: f64 = samples.iter().zip(&weights).map(|(x, w)| **x * w).sum();
        let variance: f64 = samples
            .iter()
            .zip(&weights)
            .map(|(x, w)| w * (**x - mean).powi(2))
            .sum();
        let n_eff = weights.iter().map(|w| w * w).sum::<f64>().recip();
        let mut bandwidth = variance.sqrt() * n_eff.powf(-0.2);
        if !(bandwidth > 0.0) {
            bandwidth = f64::max(1e-3 * mean.abs(), 1e-6);
        }

        Ok(Self {
            samples,
            weights: weights
                .into_iter()
                .map(NotNan::new)
                .collect::<Result<_, _>>()
                .map_err(|_| NumericalError::NonFinite("posterior weights"))?,
            bandwidth: NotNan::new(bandwidth)
                .map_err(|_| NumericalError::NonFinite("kernel bandwidth"))?,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        *self.bandwidth
    }

    /// Sample range, widened by the bandwidth if all samples coincide
    pub fn support(&self) -> (f64, f64) {
        let (lower, upper) = self
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(**x), hi.max(**x))
            });
        if upper > lower {
            (lower, upper)
        } else {
            (lower - self.bandwidth(), upper + self.bandwidth())
        }
    }
}

impl LnPrior1DTrait for EmpiricalLnPrior1D {
    fn ln_prior_1d(&self, x: f64) -> f64 {
        f64::ln(self.density(x))
    }

    fn density(&self, x: f64) -> f64 {
        let h = self.bandwidth();
        let norm = (h * TAU.sqrt()).recip();
        self.samples
            .iter()
            .zip(&self.weights)
            .map(|(xi, w)| **w * f64::exp(-0.5 * ((x - **xi) / h).powi(2)))
            .sum::<f64>()
            * norm
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, JsonSchema)]
struct GaussianKernel {
    mu: NotNan<f64>,
    std: NotNan<f64>,
    ln_prob_coeff: NotNan<f64>,
}

impl GaussianKernel {
    fn new(mu: f64, std: f64) -> Self {
        assert!(std > 0.0 && std.is_finite(), "std must be positive and finite");
        Self {
            mu: NotNan::new(mu).expect("mu must be not NaN"),
            std: NotNan::new(std).expect("std must be positive and finite"),
            ln_prob_coeff: NotNan::new(-f64::ln(std) - 0.5 * f64::ln(TAU))
                .expect("std must be positive and finite"),
        }
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        *self.ln_prob_coeff - 0.5 * ((x - *self.mu) / *self.std).powi(2)
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "GaussianLnPrior1D")]
struct GaussianLnPrior1DParameters {
    mu: f64,
    std: f64,
}

impl From<GaussianKernel> for GaussianLnPrior1DParameters {
    fn from(k: GaussianKernel) -> Self {
        Self {
            mu: *k.mu,
            std: *k.std,
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "RangeLnPrior1D")]
struct RangeLnPrior1DParameters {
    range: std::ops::RangeInclusive<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn integrate(prior: &LnPrior1D, lower: f64, upper: f64) -> f64 {
        let n = 20_000;
        let dx = (upper - lower) / n as f64;
        (0..n)
            .map(|i| prior.density(lower + (i as f64 + 0.5) * dx) * dx)
            .sum()
    }

    #[test]
    fn densities_are_normalized() {
        for (prior, lower, upper) in [
            (LnPrior1D::normal(1.0, 2.0), -20.0, 20.0),
            (LnPrior1D::uniform(-1.0, 3.0), -2.0, 4.0),
            (LnPrior1D::log_uniform(0.1, 10.0), 0.05, 11.0),
            (LnPrior1D::log_normal(0.0, 0.5), 1e-6, 30.0),
            (
                LnPrior1D::mix(&[
                    (1.0, LnPrior1D::normal(-3.0, 1.0)),
                    (3.0, LnPrior1D::normal(3.0, 1.0)),
                ]),
                -20.0,
                20.0,
            ),
        ] {
            assert_relative_eq!(integrate(&prior, lower, upper), 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn outside_of_range_is_impossible() {
        assert_eq!(
            LnPrior1D::uniform(0.0, 1.0).ln_prior_1d(1.5),
            f64::NEG_INFINITY
        );
        assert_eq!(
            LnPrior1D::log_uniform(1.0, 2.0).ln_prior_1d(-1.0),
            f64::NEG_INFINITY
        );
        assert_eq!(LnPrior1D::none().ln_prior_1d(1e300), 0.0);
    }

    #[test]
    fn empirical_follows_samples() {
        let samples: Vec<f64> = (0..200).map(|i| 5.0 + 0.01 * (i as f64 - 100.0)).collect();
        let weights = vec![1.0; samples.len()];
        let prior = LnPrior1D::empirical(&samples, &weights).unwrap();
        assert_relative_eq!(integrate(&prior, -5.0, 15.0), 1.0, epsilon = 1e-3);
        assert!(prior.density(5.0) > 100.0 * prior.density(7.0));
    }

    #[test]
    fn empirical_ignores_zero_weights() {
        let prior = EmpiricalLnPrior1D::new(&[0.0, 1.0, 100.0], &[1.0, 1.0, 0.0]).unwrap();
        assert_eq!(prior.support(), (0.0, 1.0));
        assert_eq!(
            EmpiricalLnPrior1D::new(&[1.0], &[0.0]),
            Err(NumericalError::DegeneratePosterior)
        );
    }

    #[test]
    fn serialization() {
        let prior = LnPrior1D::mix(&[
            (1.0, LnPrior1D::normal(0.0, 1.0)),
            (1.0, LnPrior1D::log_uniform(1.0, 2.0)),
        ]);
        let json = serde_json::to_string(&prior).unwrap();
        let restored: LnPrior1D = serde_json::from_str(&json).unwrap();
        assert_eq!(prior, restored);
    }
}
