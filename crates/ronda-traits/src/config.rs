//! Model configurations.
//!
//! A [`ModelConfiguration`] is an ordered map of named parameter values. It is
//! proposed by the search, passed to adapters on every fit, and frozen once
//! selected as the best configuration for an asset/model pair.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, RondaError};

/// Reserved key holding the seed of stochastic adapters.
pub const SEED_KEY: &str = "seed";

/// Reserved key overriding the rolling training window length.
pub const TRAIN_WINDOW_KEY: &str = "train_window";

/// Reserved key enabling in-fold top-k feature selection.
pub const FEATURE_TOP_K_KEY: &str = "feature_top_k";

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer parameter.
    Int(i64),
    /// Floating-point parameter.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Free text, e.g. an objective or kernel name.
    Text(String),
}

impl ParamValue {
    /// Integer view; floats with no fractional part are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Float view; integers are widened.
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Named hyperparameter values, ordered by name.
///
/// Ordering makes [`key`](Self::key) and serialisation stable, which keeps
/// search histories and artifacts reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfiguration {
    values: BTreeMap<String, ParamValue>,
}

impl ModelConfiguration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns a value by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Whether a value is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads a non-negative integer parameter, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the value is present but is
    /// not a non-negative integer.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| {
                    RondaError::InvalidConfig(format!(
                        "'{name}' must be a non-negative integer, got {value}"
                    ))
                }),
        }
    }

    /// Reads a float parameter, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the value is not numeric.
    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| {
                RondaError::InvalidConfig(format!("'{name}' must be numeric, got {value}"))
            }),
        }
    }

    /// Reads a boolean parameter, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the value is not a boolean.
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| {
                RondaError::InvalidConfig(format!("'{name}' must be a boolean, got {value}"))
            }),
        }
    }

    /// Reads a text parameter, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the value is not text.
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| {
                RondaError::InvalidConfig(format!("'{name}' must be text, got {value}"))
            }),
        }
    }

    /// Seed for stochastic adapters; zero when unset.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the seed is not a non-negative integer.
    pub fn seed(&self) -> Result<u64> {
        self.usize_or(SEED_KEY, 0).map(|s| s as u64)
    }

    /// Stable textual key, e.g. `order=2,seed=7`.
    ///
    /// Used to de-duplicate proposals and to label artifacts.
    pub fn key(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<(String, ParamValue)> for ModelConfiguration {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
