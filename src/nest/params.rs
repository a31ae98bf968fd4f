use crate::error::{ConfigurationError, FitError};
use crate::prior::{InverseCdf, PriorSource};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Values of the parameters resolved so far, in declaration order
pub struct Resolved<'a> {
    names: &'a [String],
    values: &'a [f64],
}

impl Resolved<'_> {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn values(&self) -> &[f64] {
        self.values
    }
}

/// Function computing a tied parameter from the parameters declared before it
pub type TieFn = Arc<dyn Fn(&Resolved<'_>) -> f64 + Send + Sync>;

/// How a parameter gets its value from a point of the unit cube
#[derive(Clone)]
pub enum ParamSpec {
    Free(InverseCdf),
    Tied(TieFn),
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free(icdf) => f.debug_tuple("Free").field(icdf).finish(),
            Self::Tied(_) => f.write_str("Tied(..)"),
        }
    }
}

/// Named collection of tie functions
#[derive(Clone, Default)]
pub struct Ties(BTreeMap<String, TieFn>);

impl Ties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Resolved<'_>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.0.insert(name.into(), Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<&TieFn> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl fmt::Debug for Ties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Lower and upper bounds of parameters by name
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParameterBounds(BTreeMap<String, (f64, f64)>);

impl ParameterBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.insert(name, lower, upper);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, lower: f64, upper: f64) {
        self.0.insert(name.into(), (lower, upper));
    }

    pub fn get(&self, name: &str) -> Option<(f64, f64)> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<(f64, f64)> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.0.iter().map(|(name, &b)| (name.as_str(), b))
    }
}

impl<S: Into<String>> FromIterator<(S, (f64, f64))> for ParameterBounds {
    fn from_iter<I: IntoIterator<Item = (S, (f64, f64))>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, b)| (s.into(), b)).collect())
    }
}

/// Ordered parameters of a fit and the prior transform from the unit cube
///
/// Free parameters take one unit-cube coordinate each, in declaration order. Tied parameters
/// take none and are computed from the parameters declared before them.
#[derive(Clone, Debug, Default)]
pub struct ParameterSpace {
    names: Vec<String>,
    specs: Vec<ParamSpec>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, spec: ParamSpec) {
        self.names.push(name.into());
        self.specs.push(spec);
    }

    pub fn with_free(mut self, name: impl Into<String>, icdf: InverseCdf) -> Self {
        self.push(name, ParamSpec::Free(icdf));
        self
    }

    pub fn with_tied(mut self, name: impl Into<String>, f: TieFn) -> Self {
        self.push(name, ParamSpec::Tied(f));
        self
    }

    /// Resolve every name to a spec, a tie takes precedence over a prior source
    ///
    /// Returns [ConfigurationError::MissingPrior] for a name with neither.
    pub fn from_sources(
        names: &[String],
        sources: &BTreeMap<String, PriorSource>,
        ties: &Ties,
    ) -> Result<Self, FitError> {
        let mut space = Self::new();
        for name in names {
            let spec = if let Some(f) = ties.get(name) {
                ParamSpec::Tied(f.clone())
            } else if let Some(source) = sources.get(name) {
                ParamSpec::Free(source.inverse_cdf(name)?)
            } else {
                return Err(ConfigurationError::MissingPrior {
                    param: name.clone(),
                }
                .into());
            };
            space.push(name.clone(), spec);
        }
        if space.npdim() == 0 {
            return Err(ConfigurationError::EmptyParameterSpace.into());
        }
        Ok(space)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Number of all parameters
    #[inline]
    pub fn ndim(&self) -> usize {
        self.names.len()
    }

    /// Number of free parameters, the dimension of the unit cube
    pub fn npdim(&self) -> usize {
        self.specs
            .iter()
            .filter(|spec| matches!(spec, ParamSpec::Free(_)))
            .count()
    }

    /// Map a unit-cube point `u` of length `npdim` to parameter values of length `ndim`
    pub fn prior_transform(&self, u: &[f64], out: &mut [f64]) {
        let mut free = u.iter();
        for (i, spec) in self.specs.iter().enumerate() {
            out[i] = match spec {
                ParamSpec::Free(icdf) => free.next().map_or(f64::NAN, |&u| icdf.ppf(u)),
                ParamSpec::Tied(f) => f(&Resolved {
                    names: &self.names[..i],
                    values: &out[..i],
                }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn missing_prior() {
        let sources = BTreeMap::from([("a".to_owned(), PriorSource::flat(0.0, 1.0))]);
        let result = ParameterSpace::from_sources(&names(&["a", "b"]), &sources, &Ties::new());
        assert_eq!(
            result.unwrap_err(),
            FitError::Configuration(ConfigurationError::MissingPrior {
                param: "b".to_owned()
            })
        );
    }

    #[test]
    fn only_tied_is_empty() {
        let ties = Ties::new().with("a", |_| 1.0);
        let result = ParameterSpace::from_sources(&names(&["a"]), &BTreeMap::new(), &ties);
        assert_eq!(
            result.unwrap_err(),
            FitError::Configuration(ConfigurationError::EmptyParameterSpace)
        );
    }

    #[test]
    fn tied_parameters_follow_free_ones() {
        let sources = BTreeMap::from([
            ("a".to_owned(), PriorSource::flat(0.0, 10.0)),
            ("c".to_owned(), PriorSource::flat(-1.0, 1.0)),
        ]);
        let ties = Ties::new().with("b", |r: &Resolved<'_>| 2.0 * r.get("a").unwrap_or(f64::NAN));
        let space =
            ParameterSpace::from_sources(&names(&["a", "b", "c"]), &sources, &ties).unwrap();
        assert_eq!(space.ndim(), 3);
        assert_eq!(space.npdim(), 2);

        let mut v = [0.0; 3];
        space.prior_transform(&[0.3, 0.75], &mut v);
        assert_relative_eq!(v[0], 3.0);
        assert_relative_eq!(v[1], 6.0);
        assert_relative_eq!(v[2], 0.5);
    }

    #[test]
    fn bounds() {
        let mut bounds: ParameterBounds = [("t0", (-5.0, 5.0))].into_iter().collect();
        bounds.insert("amplitude", 0.0, 1.0);
        assert_eq!(bounds.get("t0"), Some((-5.0, 5.0)));
        assert_eq!(bounds.iter().count(), 2);
        assert_eq!(bounds.remove("t0"), Some((-5.0, 5.0)));
        assert!(!bounds.contains("t0"));
    }
}
