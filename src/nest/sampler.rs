use crate::error::{ConfigurationError, FitError, NumericalError};
use crate::nest::ellipsoid::Ellipsoid;
use crate::nest::{FitResult, ParameterSpace};

use ndarray::{Array1, Array2};
use rand::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Upper limit of proposals for a single live point replacement
const MAX_PROPOSALS: usize = 1_000_000;

/// Target acceptance fraction of a random walk
const WALK_ACCEPTANCE: f64 = 0.5;

/// Random walk step scale limits, in units of the live point spread
const MIN_WALK_SCALE: f64 = 1e-6;
const MAX_WALK_SCALE: f64 = 4.0;

/// Method to draw a replacement live point
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SamplerMethod {
    /// Uniform sampling from a single enlarged bounding ellipsoid of the live points
    #[default]
    Single,
    /// Random walk from a randomly chosen live point with adaptive step size
    Classic,
}

/// Nested sampling settings
///
/// Sampling stops when the estimated remaining evidence is below `dlogz` (natural logarithm),
/// or when `maxiter` iterations or `maxcall` likelihood calls are done.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SamplerConfig {
    pub method: SamplerMethod,
    pub npoints: usize,
    pub maxiter: Option<usize>,
    pub maxcall: Option<usize>,
    pub dlogz: f64,
    /// Volume enlargement factor of the bounding ellipsoid
    pub enlarge: f64,
    /// Likelihood calls between bounding region updates, `0.6 npoints` by default
    pub update_interval: Option<usize>,
    /// Minimum number of random walk steps of [SamplerMethod::Classic]
    pub walk_steps: usize,
    /// Random seed, drawn from the OS if `None`
    pub seed: Option<u64>,
}

impl SamplerConfig {
    pub fn new(method: SamplerMethod, npoints: usize) -> Self {
        Self {
            method,
            npoints,
            maxiter: None,
            maxcall: None,
            dlogz: Self::default_dlogz(),
            enlarge: Self::default_enlarge(),
            update_interval: None,
            walk_steps: Self::default_walk_steps(),
            seed: None,
        }
    }

    #[inline]
    pub fn default_npoints() -> usize {
        100
    }

    #[inline]
    pub fn default_dlogz() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_enlarge() -> f64 {
        1.2
    }

    #[inline]
    pub fn default_walk_steps() -> usize {
        20
    }

    pub fn with_npoints(mut self, npoints: usize) -> Self {
        self.npoints = npoints;
        self
    }

    pub fn with_maxcall(mut self, maxcall: Option<usize>) -> Self {
        self.maxcall = maxcall;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn update_interval(&self) -> usize {
        self.update_interval
            .unwrap_or_else(|| (0.6 * self.npoints as f64).round() as usize)
            .max(1)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.npoints < 2 {
            return Err(ConfigurationError::InvalidSamplerConfig(
                "at least two live points are required",
            ));
        }
        if !(self.dlogz > 0.0) {
            return Err(ConfigurationError::InvalidSamplerConfig(
                "dlogz must be positive",
            ));
        }
        if !(self.enlarge >= 1.0) {
            return Err(ConfigurationError::InvalidSamplerConfig(
                "enlarge must not be less than unity",
            ));
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new(SamplerMethod::default(), Self::default_npoints())
    }
}

/// Nested sampler, see Skilling (2004) and Mukherjee, Parkinson & Liddle (2006)
#[derive(Clone, Debug, Default)]
pub struct NestedSampler {
    config: SamplerConfig,
}

impl NestedSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample the posterior of `loglike` over `space`
    ///
    /// NaN log-likelihood is treated as `-inf`. Fails with [NumericalError::DegeneratePosterior]
    /// if no point with finite likelihood is found, and with [NumericalError::SamplerStalled] if
    /// a live point can't be replaced before `maxcall` is reached.
    pub fn run<L>(&self, space: &ParameterSpace, loglike: L) -> Result<FitResult, FitError>
    where
        L: Fn(&[f64]) -> f64,
    {
        self.config.validate()?;
        let npdim = space.npdim();
        if npdim == 0 {
            return Err(ConfigurationError::EmptyParameterSpace.into());
        }
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut run = Run {
            config: &self.config,
            space,
            loglike,
            rng,
            region: Region::Cube,
        };
        run.sample()
    }
}

enum Region {
    Cube,
    Ellipsoid(Ellipsoid),
    Walk { std: Vec<f64>, scale: f64 },
}

struct Live {
    u: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
    logl: Vec<f64>,
}

struct Point {
    u: Vec<f64>,
    v: Vec<f64>,
    logl: f64,
}

struct Run<'a, L> {
    config: &'a SamplerConfig,
    space: &'a ParameterSpace,
    loglike: L,
    rng: StdRng,
    region: Region,
}

impl<L> Run<'_, L>
where
    L: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, u: Vec<f64>) -> Point {
        let mut v = vec![0.0; self.space.ndim()];
        self.space.prior_transform(&u, &mut v);
        let logl = (self.loglike)(&v);
        Point {
            u,
            v,
            logl: if logl.is_nan() { f64::NEG_INFINITY } else { logl },
        }
    }

    fn sample(&mut self) -> Result<FitResult, FitError> {
        let npoints = self.config.npoints;
        let n = npoints as f64;
        let npdim = self.space.npdim();
        let maxiter = self.config.maxiter.unwrap_or(usize::MAX);
        let maxcall = self.config.maxcall.unwrap_or(usize::MAX);
        let update_interval = self.config.update_interval();

        let mut live = Live {
            u: vec![],
            v: vec![],
            logl: vec![],
        };
        for _ in 0..npoints {
            let u: Vec<f64> = (0..npdim).map(|_| self.rng.random::<f64>()).collect();
            let point = self.evaluate(u);
            live.u.push(point.u);
            live.v.push(point.v);
            live.logl.push(point.logl);
        }
        if live.logl.iter().all(|&logl| logl == f64::NEG_INFINITY) {
            return Err(NumericalError::DegeneratePosterior.into());
        }

        let mut saved_v: Vec<Vec<f64>> = vec![];
        let mut saved_logwt: Vec<f64> = vec![];
        let mut saved_logl: Vec<f64> = vec![];
        let mut h = 0.0;
        let mut logz = -1e300;
        let mut logvol = f64::ln(1.0 - f64::exp(-1.0 / n));
        let mut ncall = npoints;
        let mut since_update = update_interval;

        let mut it = 0;
        while it < maxiter {
            let worst = argmin(&live.logl);
            let loglstar = live.logl[worst];
            let logwt = logvol + loglstar;
            (logz, h) = accumulate(logz, h, logwt, loglstar);
            saved_v.push(live.v[worst].clone());
            saved_logwt.push(logwt);
            saved_logl.push(loglstar);

            if since_update >= update_interval {
                self.update_region(&live, -(it as f64) / n);
                since_update = 0;
            }

            let budget = maxcall.saturating_sub(ncall).clamp(1, MAX_PROPOSALS);
            match self.new_point(&live, worst, loglstar, budget) {
                Ok((point, calls)) => {
                    live.u[worst] = point.u;
                    live.v[worst] = point.v;
                    live.logl[worst] = point.logl;
                    ncall += calls;
                    since_update += calls;
                }
                Err(calls) => {
                    ncall += calls;
                    if ncall < maxcall {
                        warn!(iteration = it, ncall, "live point replacement stalled");
                        return Err(NumericalError::SamplerStalled { iteration: it }.into());
                    }
                    debug!(iteration = it, ncall, "call budget exhausted");
                    live.u.swap_remove(worst);
                    live.v.swap_remove(worst);
                    live.logl.swap_remove(worst);
                    break;
                }
            }
            logvol -= 1.0 / n;

            let logz_remain = remaining_evidence(&live.logl, it, n);
            if logaddexp(logz, logz_remain) - logz < self.config.dlogz {
                break;
            }
            if ncall > maxcall {
                break;
            }
            it += 1;
        }

        // each remaining live point takes an equal share of the remaining prior volume
        let logvol = -(saved_v.len() as f64) / n - f64::ln(live.logl.len().max(1) as f64);
        for (v, logl) in live.v.into_iter().zip(live.logl) {
            let logwt = logvol + logl;
            (logz, h) = accumulate(logz, h, logwt, logl);
            saved_v.push(v);
            saved_logwt.push(logwt);
            saved_logl.push(logl);
        }

        if !(logz > -1e300) || !logz.is_finite() {
            return Err(NumericalError::DegeneratePosterior.into());
        }
        debug!(
            niter = saved_v.len(),
            ncall,
            logz,
            h,
            "nested sampling finished"
        );

        let ndim = self.space.ndim();
        let samples = Array2::from_shape_fn((saved_v.len(), ndim), |(i, j)| saved_v[i][j]);
        FitResult::new(
            self.space.names().to_vec(),
            samples,
            Array1::from(saved_logwt),
            Array1::from(saved_logl),
            logz,
            h,
            npoints,
            ncall,
        )
    }

    fn update_region(&mut self, live: &Live, expected_ln_volume: f64) {
        match self.config.method {
            SamplerMethod::Single => {
                let points = Array2::from_shape_fn((live.u.len(), self.space.npdim()), |(i, j)| {
                    live.u[i][j]
                });
                self.region = match Ellipsoid::bounding(points.view()).and_then(|ell| {
                    let ln_volume = ell.ln_volume().max(expected_ln_volume);
                    ell.scaled_to_ln_volume(ln_volume + self.config.enlarge.ln())
                }) {
                    Ok(ell) => Region::Ellipsoid(ell),
                    Err(error) => {
                        debug!(%error, "falling back to the unit cube");
                        Region::Cube
                    }
                };
            }
            SamplerMethod::Classic => {
                let npdim = self.space.npdim();
                let n = live.u.len() as f64;
                let std = (0..npdim)
                    .map(|j| {
                        let mean = live.u.iter().map(|u| u[j]).sum::<f64>() / n;
                        let var = live.u.iter().map(|u| (u[j] - mean).powi(2)).sum::<f64>() / n;
                        var.sqrt().max(1e-10)
                    })
                    .collect();
                let scale = match self.region {
                    Region::Walk { scale, .. } => scale,
                    _ => 1.0,
                };
                self.region = Region::Walk { std, scale };
            }
        }
    }

    /// Replacement of the worst live point and the likelihood calls it took, or the calls
    /// spent without finding one
    fn new_point(
        &mut self,
        live: &Live,
        worst: usize,
        loglstar: f64,
        budget: usize,
    ) -> Result<(Point, usize), usize> {
        if let Region::Walk { .. } = self.region {
            return self.walk(live, worst, loglstar, budget);
        }
        let npdim = self.space.npdim();
        let mut proposals = 0;
        let mut calls = 0;
        while proposals < MAX_PROPOSALS && calls < budget {
            proposals += 1;
            let u = match &self.region {
                Region::Ellipsoid(ell) => ell.sample(&mut self.rng),
                _ => (0..npdim).map(|_| self.rng.random::<f64>()).collect(),
            };
            if !in_unit_cube(&u) {
                continue;
            }
            let point = self.evaluate(u);
            calls += 1;
            if point.logl > loglstar {
                return Ok((point, calls));
            }
        }
        Err(calls)
    }

    /// Random walk from a live point other than the worst one
    ///
    /// Proposals outside the unit cube count as rejections. The step is halved every
    /// `walk_steps` rejections while nothing is accepted, and the scale passed to the next walk
    /// is adapted towards the target acceptance fraction.
    fn walk(
        &mut self,
        live: &Live,
        worst: usize,
        loglstar: f64,
        budget: usize,
    ) -> Result<(Point, usize), usize> {
        let Region::Walk { std, scale } = std::mem::replace(&mut self.region, Region::Cube)
        else {
            return Err(0);
        };
        let mut start = self.rng.random_range(0..live.u.len());
        while start == worst && live.u.len() > 1 {
            start = self.rng.random_range(0..live.u.len());
        }
        let mut current = Point {
            u: live.u[start].clone(),
            v: live.v[start].clone(),
            logl: live.logl[start],
        };
        let walk_steps = self.config.walk_steps.max(1);
        let mut step = scale;
        let (mut accept, mut reject, mut calls) = (0usize, 0usize, 0usize);
        while accept + reject < walk_steps || accept == 0 {
            if calls >= budget || accept + reject >= MAX_PROPOSALS {
                self.region = Region::Walk { std, scale };
                return Err(calls);
            }
            let u: Vec<f64> = current
                .u
                .iter()
                .zip(&std)
                .map(|(&x, &s)| x + step * s * self.rng.random_range(-1.0..1.0))
                .collect();
            let moved = in_unit_cube(&u) && {
                let point = self.evaluate(u);
                calls += 1;
                if point.logl >= loglstar {
                    current = point;
                    true
                } else {
                    false
                }
            };
            if moved {
                accept += 1;
            } else {
                reject += 1;
                if accept == 0 && reject % walk_steps == 0 {
                    step = (0.5 * step).max(MIN_WALK_SCALE);
                }
            }
        }
        let acceptance = accept as f64 / (accept + reject) as f64;
        let npdim = std.len() as f64;
        let scale = (step * f64::exp((acceptance - WALK_ACCEPTANCE) / (npdim * WALK_ACCEPTANCE)))
            .clamp(MIN_WALK_SCALE, MAX_WALK_SCALE);
        self.region = Region::Walk { std, scale };
        Ok((current, calls))
    }
}

/// Add a dead point to the evidence and the information gain
fn accumulate(logz: f64, h: f64, logwt: f64, logl: f64) -> (f64, f64) {
    let logz_new = logaddexp(logz, logwt);
    if logwt == f64::NEG_INFINITY {
        return (logz_new, h);
    }
    let h_new = f64::exp(logwt - logz_new) * logl + f64::exp(logz - logz_new) * (h + logz)
        - logz_new;
    (logz_new, h_new)
}

/// Upper estimate of the evidence left after iteration `it`: the best live likelihood times the
/// prior volume `exp(-(it + 1) / n)`
fn remaining_evidence(logl: &[f64], it: usize, n: f64) -> f64 {
    logl.iter().copied().fold(f64::NEG_INFINITY, f64::max) - (it + 1) as f64 / n
}

fn logaddexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + f64::ln(f64::exp(a - max) + f64::exp(b - max))
}

fn argmin(x: &[f64]) -> usize {
    x.iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

fn in_unit_cube(u: &[f64]) -> bool {
    u.iter().all(|x| (0.0..1.0).contains(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::InverseCdf;
    use crate::quantile::Quantiles;

    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn gaussian_space() -> ParameterSpace {
        ParameterSpace::new()
            .with_free("x", InverseCdf::uniform(-10.0, 10.0))
            .with_free("y", InverseCdf::uniform(-10.0, 10.0))
    }

    fn gaussian_loglike(p: &[f64]) -> f64 {
        let (x, y) = (p[0] - 1.0, p[1] + 2.0);
        -0.5 * (x * x / 0.25 + y * y) - f64::ln(2.0 * PI * 0.5)
    }

    fn check_gaussian(method: SamplerMethod, seed: u64) {
        let config = SamplerConfig {
            method,
            seed: Some(seed),
            dlogz: 0.1,
            ..SamplerConfig::default().with_npoints(200)
        };
        let result = NestedSampler::new(config)
            .run(&gaussian_space(), gaussian_loglike)
            .unwrap();
        // evidence of a normalized likelihood over the uniform prior of area 400
        assert_relative_eq!(result.logz, -f64::ln(400.0), epsilon = 4.0 * result.logzerr);
        let x = result.param_quantiles("x").unwrap().unwrap();
        let y = result.param_quantiles("y").unwrap().unwrap();
        assert_relative_eq!(x.median, 1.0, epsilon = 0.15);
        assert_relative_eq!(y.median, -2.0, epsilon = 0.3);
        assert_relative_eq!(x.sigma(), 0.5, epsilon = 0.15);
        assert_relative_eq!(y.sigma(), 1.0, epsilon = 0.3);
    }

    #[test]
    fn single_ellipsoid_gaussian() {
        check_gaussian(SamplerMethod::Single, 0);
    }

    #[test]
    fn classic_gaussian() {
        check_gaussian(SamplerMethod::Classic, 1);
    }

    #[test]
    fn classic_gaussian_seeds() {
        for seed in 2..6 {
            check_gaussian(SamplerMethod::Classic, seed);
        }
    }

    #[test]
    fn classic_walk_does_not_exhaust_budget() {
        let config = SamplerConfig {
            method: SamplerMethod::Classic,
            seed: Some(0),
            ..SamplerConfig::default()
        };
        let result = NestedSampler::new(config)
            .run(&gaussian_space(), gaussian_loglike)
            .unwrap();
        assert!(result.ncall < 100_000, "ncall = {}", result.ncall);
    }

    #[test]
    fn plateau_stalls() {
        let config = SamplerConfig::default().with_seed(Some(0));
        let result = NestedSampler::new(config).run(&gaussian_space(), |_| 0.0);
        assert!(matches!(
            result,
            Err(FitError::Numerical(NumericalError::SamplerStalled { .. }))
        ));
    }

    #[test]
    fn seed_makes_run_reproducible() {
        let config = SamplerConfig::default().with_seed(Some(42));
        let a = NestedSampler::new(config.clone())
            .run(&gaussian_space(), gaussian_loglike)
            .unwrap();
        let b = NestedSampler::new(config)
            .run(&gaussian_space(), gaussian_loglike)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn maxcall_stops_sampling() {
        let config = SamplerConfig::default()
            .with_seed(Some(0))
            .with_maxcall(Some(300));
        let result = NestedSampler::new(config)
            .run(&gaussian_space(), gaussian_loglike)
            .unwrap();
        assert!(result.ncall <= 301);
        let q = Quantiles::from_weighted(
            result.column("x").unwrap(),
            result.weights.view(),
        )
        .unwrap();
        assert!(q.lower <= q.median && q.median <= q.upper);
    }

    #[test]
    fn nowhere_finite_likelihood() {
        let config = SamplerConfig::default().with_seed(Some(0));
        let result = NestedSampler::new(config).run(&gaussian_space(), |_| f64::NEG_INFINITY);
        assert_eq!(
            result.unwrap_err(),
            FitError::Numerical(NumericalError::DegeneratePosterior)
        );
    }

    #[test]
    fn invalid_config() {
        let config = SamplerConfig::default().with_npoints(1);
        assert!(matches!(
            NestedSampler::new(config).run(&gaussian_space(), gaussian_loglike),
            Err(FitError::Configuration(
                ConfigurationError::InvalidSamplerConfig(_)
            ))
        ));
    }

    #[test]
    fn remaining_evidence_uses_current_volume() {
        assert_relative_eq!(remaining_evidence(&[-3.0, 0.0, -1.0], 0, 100.0), -0.01);
        assert_relative_eq!(remaining_evidence(&[2.0], 49, 50.0), 1.0);
    }

    #[test]
    fn logaddexp_handles_infinities() {
        assert_eq!(logaddexp(f64::NEG_INFINITY, 1.0), 1.0);
        assert_relative_eq!(logaddexp(0.0, 0.0), f64::ln(2.0));
        assert_relative_eq!(logaddexp(-1e300, 0.0), 0.0);
    }
}
