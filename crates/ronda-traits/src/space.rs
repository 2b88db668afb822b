//! Configuration search spaces.
//!
//! Every parameter is mapped onto the unit interval so proposers can sample
//! and model densities without knowing the parameter kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ModelConfiguration, ParamValue, Result, RondaError};

/// Domain of a single hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSpec {
    /// Integers in `low..=high`.
    Int {
        /// Inclusive lower bound.
        low: i64,
        /// Inclusive upper bound.
        high: i64,
    },
    /// Floats in `[low, high]`, optionally sampled on a log scale.
    Float {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
        /// Sample uniformly in log space; requires `low > 0`.
        #[serde(default)]
        log: bool,
    },
    /// One of a fixed list of values.
    Categorical(Vec<ParamValue>),
}

impl ParamSpec {
    /// Checks bounds and non-emptiness.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for empty or inverted domains.
    pub fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            Self::Int { low, high } => low <= high,
            Self::Float { low, high, log } => {
                low.is_finite() && high.is_finite() && low <= high && (!log || *low > 0.0)
            }
            Self::Categorical(choices) => !choices.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(RondaError::InvalidConfig(format!(
                "parameter '{name}' has an empty or invalid domain: {self:?}"
            )))
        }
    }

    /// Maps `u` in `[0, 1]` onto the domain.
    pub fn from_unit(&self, u: f64) -> ParamValue {
        let u = u.clamp(0.0, 1.0);
        match self {
            Self::Int { low, high } => {
                let width = int_width(*low, *high);
                let offset = ((u * (width + 1) as f64).floor() as i128).min(width);
                ParamValue::Int(clamp_int(i128::from(*low) + offset, *low, *high))
            }
            Self::Float { low, high, log: true } => {
                let (a, b) = (low.ln(), high.ln());
                ParamValue::Float((a + u * (b - a)).exp())
            }
            Self::Float { low, high, log: false } => ParamValue::Float(low + u * (high - low)),
            Self::Categorical(choices) => {
                let idx = ((u * choices.len() as f64).floor() as usize).min(choices.len() - 1);
                choices[idx].clone()
            }
        }
    }

    /// Maps a value back onto `[0, 1]`; the inverse of [`from_unit`](Self::from_unit)
    /// up to discretisation. Returns `None` for values outside the domain.
    pub fn to_unit(&self, value: &ParamValue) -> Option<f64> {
        match self {
            Self::Int { low, high } => {
                let v = value.as_i64()?;
                if v < *low || v > *high {
                    return None;
                }
                let width = int_width(*low, *high);
                Some(((i128::from(v) - i128::from(*low)) as f64 + 0.5) / (width + 1) as f64)
            }
            Self::Float { low, high, log } => {
                let v = value.as_f64()?;
                if v < *low || v > *high {
                    return None;
                }
                if high == low {
                    return Some(0.5);
                }
                if *log {
                    Some((v.ln() - low.ln()) / (high.ln() - low.ln()))
                } else {
                    Some((v - low) / (high - low))
                }
            }
            Self::Categorical(choices) => {
                let idx = choices.iter().position(|c| c == value)?;
                Some((idx as f64 + 0.5) / choices.len() as f64)
            }
        }
    }

    /// Discretises the domain into at most `levels` values (all of them for
    /// small integer and categorical domains).
    pub fn grid(&self, levels: usize) -> Vec<ParamValue> {
        let levels = levels.max(1);
        match self {
            Self::Int { low, high } => {
                let width = int_width(*low, *high);
                if width < levels as i128 {
                    (*low..=*high).map(ParamValue::Int).collect()
                } else {
                    let mut values: Vec<ParamValue> = (0..levels)
                        .map(|i| {
                            let frac = i as f64 / (levels - 1).max(1) as f64;
                            let offset = (width as f64 * frac).round() as i128;
                            ParamValue::Int(clamp_int(i128::from(*low) + offset, *low, *high))
                        })
                        .collect();
                    values.dedup();
                    values
                }
            }
            Self::Float { .. } => {
                if levels == 1 {
                    return vec![self.from_unit(0.5)];
                }
                (0..levels)
                    .map(|i| self.from_unit(i as f64 / (levels - 1) as f64))
                    .collect()
            }
            Self::Categorical(choices) => choices.clone(),
        }
    }
}

/// Distance `high - low`, which can exceed `i64::MAX` for wide domains.
fn int_width(low: i64, high: i64) -> i128 {
    i128::from(high) - i128::from(low)
}

fn clamp_int(value: i128, low: i64, high: i64) -> i64 {
    i64::try_from(value.clamp(i128::from(low), i128::from(high))).unwrap_or(high)
}

/// Named parameter domains plus fixed values that every proposal carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    fixed: ModelConfiguration,
}

impl SearchSpace {
    /// Creates an empty space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an integer parameter.
    #[must_use]
    pub fn int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.params.insert(name.into(), ParamSpec::Int { low, high });
        self
    }

    /// Adds a float parameter.
    #[must_use]
    pub fn float(mut self, name: impl Into<String>, low: f64, high: f64, log: bool) -> Self {
        self.params
            .insert(name.into(), ParamSpec::Float { low, high, log });
        self
    }

    /// Adds a categorical parameter.
    #[must_use]
    pub fn categorical(mut self, name: impl Into<String>, choices: Vec<ParamValue>) -> Self {
        self.params
            .insert(name.into(), ParamSpec::Categorical(choices));
        self
    }

    /// Adds a value that is not searched but included in every proposal.
    #[must_use]
    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fixed.insert(name, value);
        self
    }

    /// Searched parameters in name order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fixed values.
    pub const fn fixed_values(&self) -> &ModelConfiguration {
        &self.fixed
    }

    /// Number of searched parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether nothing is searched.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Validates every domain.
    ///
    /// # Errors
    ///
    /// Returns the first invalid domain as [`RondaError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        self.params
            .iter()
            .try_for_each(|(name, spec)| spec.validate(name))
    }

    /// Builds a configuration from unit coordinates, one per parameter in name order.
    pub fn from_units(&self, units: &[f64]) -> ModelConfiguration {
        let mut config = self.fixed.clone();
        for ((name, spec), u) in self.params.iter().zip(units) {
            config.insert(name.clone(), spec.from_unit(*u));
        }
        config
    }

    /// Unit coordinates of a configuration, `None` when any searched value is
    /// missing or outside its domain.
    pub fn to_units(&self, config: &ModelConfiguration) -> Option<Vec<f64>> {
        self.params
            .iter()
            .map(|(name, spec)| config.get(name).and_then(|v| spec.to_unit(v)))
            .collect()
    }

    /// Cartesian product of per-parameter grids, in lexicographic name order.
    pub fn grid(&self, levels: usize) -> Vec<ModelConfiguration> {
        let mut configs = vec![self.fixed.clone()];
        for (name, spec) in &self.params {
            let values = spec.grid(levels);
            let mut expanded = Vec::with_capacity(configs.len() * values.len());
            for base in &configs {
                for value in &values {
                    expanded.push(base.clone().with(name.clone(), value.clone()));
                }
            }
            configs = expanded;
        }
        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_int_unit_mapping() {
        let spec = ParamSpec::Int { low: 1, high: 4 };
        assert_eq!(spec.from_unit(0.0), ParamValue::Int(1));
        assert_eq!(spec.from_unit(1.0), ParamValue::Int(4));
        assert_eq!(spec.from_unit(0.3), ParamValue::Int(2));
        let u = spec.to_unit(&ParamValue::Int(3)).unwrap();
        assert_eq!(spec.from_unit(u), ParamValue::Int(3));
        assert!(spec.to_unit(&ParamValue::Int(9)).is_none());
    }

    #[test]
    fn test_full_range_int() {
        let spec = ParamSpec::Int {
            low: i64::MIN,
            high: i64::MAX,
        };
        assert!(spec.validate("x").is_ok());
        assert_eq!(spec.from_unit(0.0), ParamValue::Int(i64::MIN));
        assert_eq!(spec.from_unit(0.5), ParamValue::Int(0));
        assert_eq!(spec.from_unit(1.0), ParamValue::Int(i64::MAX));
        assert_relative_eq!(spec.to_unit(&ParamValue::Int(0)).unwrap(), 0.5, epsilon = 1e-12);

        let grid = spec.grid(3);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], ParamValue::Int(i64::MIN));
        assert_eq!(grid[2], ParamValue::Int(i64::MAX));
    }

    #[test]
    fn test_log_float_mapping() {
        let spec = ParamSpec::Float {
            low: 1e-3,
            high: 1e-1,
            log: true,
        };
        match spec.from_unit(0.5) {
            ParamValue::Float(v) => assert_relative_eq!(v, 1e-2, epsilon = 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert_relative_eq!(spec.to_unit(&ParamValue::Float(1e-2)).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_domains() {
        assert!(ParamSpec::Int { low: 3, high: 1 }.validate("x").is_err());
        assert!(
            ParamSpec::Float {
                low: 0.0,
                high: 1.0,
                log: true
            }
            .validate("x")
            .is_err()
        );
        assert!(ParamSpec::Categorical(vec![]).validate("x").is_err());
    }

    #[test]
    fn test_grid_product() {
        let space = SearchSpace::new()
            .int("order", 1, 2)
            .categorical("trend", vec![true.into(), false.into()])
            .fixed("seed", 7_i64);
        let grid = space.grid(5);
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|c| c.get("seed") == Some(&ParamValue::Int(7))));
        assert_eq!(grid[0].key(), "order=1,seed=7,trend=true");
    }

    #[test]
    fn test_window_sweep_grid() {
        let windows: Vec<ParamValue> = [63_i64, 126, 189, 252, 504, 756]
            .into_iter()
            .map(ParamValue::Int)
            .collect();
        let space = SearchSpace::new().categorical("train_window", windows);
        assert_eq!(space.grid(2).len(), 6);
    }

    #[test]
    fn test_units_round_trip_configuration() {
        let space = SearchSpace::new().int("a", 0, 9).float("b", 0.0, 1.0, false);
        let config = space.from_units(&[0.55, 0.25]);
        let units = space.to_units(&config).unwrap();
        assert_eq!(space.from_units(&units), config);
    }
}
