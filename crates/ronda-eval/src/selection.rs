//! In-fold feature selection.
//!
//! Selection only ever looks at the training rows of a fold, so the chosen
//! columns cannot depend on validation data.

use ronda_traits::stats::pearson;
use ronda_traits::{FEATURE_TOP_K_KEY, FrameView, ModelConfiguration, Result, RondaError};
use serde::{Deserialize, Serialize};

/// Feature selection strategy applied inside each fold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// Use every feature.
    #[default]
    All,
    /// Keep the `k` features with the largest absolute Pearson correlation
    /// to the target over the training rows.
    TopKByCorrelation(usize),
    /// Keep an explicit subset.
    Named(Vec<String>),
}

impl FeatureSelection {
    /// Strategy in effect for a configuration; `feature_top_k` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when `feature_top_k` is not a
    /// non-negative integer.
    pub fn resolve(&self, config: &ModelConfiguration) -> Result<Self> {
        if config.contains(FEATURE_TOP_K_KEY) {
            Ok(Self::TopKByCorrelation(config.usize_or(FEATURE_TOP_K_KEY, 0)?))
        } else {
            Ok(self.clone())
        }
    }

    /// Chooses frame column indices from the training view.
    ///
    /// Returns `None` when every column is kept. Selected indices are sorted
    /// ascending so column order matches the frame.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for `k == 0` or unknown names.
    pub fn select(&self, train: &FrameView<'_>) -> Result<Option<Vec<usize>>> {
        match self {
            Self::All => Ok(None),
            Self::TopKByCorrelation(0) => Err(RondaError::InvalidConfig(
                "feature_top_k must be positive".to_string(),
            )),
            Self::TopKByCorrelation(k) => {
                let n_features = train.n_features();
                if *k >= n_features {
                    return Ok(None);
                }
                let features = train.features();
                let target = train.target_values();
                let scores: Vec<f64> = (0..n_features)
                    .map(|j| {
                        let column = features.column(j).to_vec();
                        let r = pearson(&column, &target).abs();
                        if r.is_finite() { r } else { f64::NEG_INFINITY }
                    })
                    .collect();

                let mut order: Vec<usize> = (0..n_features).collect();
                // stable: ties keep the lower index first
                order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
                let mut chosen = order[..*k].to_vec();
                chosen.sort_unstable();
                Ok(Some(chosen))
            }
            Self::Named(names) => {
                let available = train.feature_names();
                names
                    .iter()
                    .map(|name| {
                        available
                            .iter()
                            .position(|n| n == name)
                            .ok_or_else(|| {
                                RondaError::InvalidConfig(format!(
                                    "unknown feature '{name}' for {}",
                                    train.asset()
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|mut idx| {
                        idx.sort_unstable();
                        idx.dedup();
                        Some(idx)
                    })
            }
        }
    }
}
