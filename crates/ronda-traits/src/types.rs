//! Common types used throughout the ronda engine.

use serde::{Deserialize, Serialize};

// Re-export date type from chrono
pub use chrono::NaiveDate as Date;

/// An asset identifier.
///
/// Typically a ticker such as "AAPL", "EURUSD" or "BTCUSDT".
pub type AssetId = String;

/// The prediction task a frame, adapter or metric set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Continuous targets scored with error metrics.
    Regression,
    /// Categorical targets scored with classification metrics.
    Classification,
}

impl Task {
    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Classification => "classification",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model family classification.
///
/// Families differ radically in their internals; the walk-forward contract
/// treats them identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// ARIMA, Prophet and other classical series models
    Statistical,
    /// XGBoost, LightGBM, CatBoost, Random Forest
    TreeEnsemble,
    /// LSTM and other recurrent networks
    DeepSequence,
    /// Markov chains and hidden Markov models
    Markov,
}

impl ModelFamily {
    /// Get a human-readable description of the family.
    #[must_use]
    pub const fn description(&self) -> &str {
        match self {
            Self::Statistical => "Classical univariate series models (ARIMA, Prophet)",
            Self::TreeEnsemble => "Gradient-boosted and bagged tree ensembles over engineered features",
            Self::DeepSequence => "Recurrent networks over lookback windows",
            Self::Markov => "Regime models over observed or hidden Markov states",
        }
    }

    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::TreeEnsemble => "tree_ensemble",
            Self::DeepSequence => "deep_sequence",
            Self::Markov => "markov",
        }
    }

    /// All families in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Statistical,
        Self::TreeEnsemble,
        Self::DeepSequence,
        Self::Markov,
    ];
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
