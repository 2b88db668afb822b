//! Error types for the ronda engine.
//!
//! The taxonomy separates failures that are recovered locally and recorded as
//! data (a failed fold, a failed trial) from failures that stop the evaluation
//! of one model or one asset. [`FailureKind`] is the serialisable tag used when
//! a failure is stored inside a result rather than propagated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for ronda operations.
#[derive(Debug, Error)]
pub enum RondaError {
    /// Training data was insufficient or the estimator failed to converge.
    ///
    /// Local to one fold or trial; the validator records it and continues.
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// The adapter cannot serve the requested prediction horizon without retraining.
    #[error("Unsupported horizon: requested {requested} steps, adapter supports at most {max}")]
    UnsupportedHorizon {
        /// Steps ahead that were requested.
        requested: usize,
        /// Largest horizon the adapter serves.
        max: usize,
    },

    /// No viable configuration was found for an asset/model pair.
    #[error("Search exhausted for {asset}/{model}: every trial failed")]
    SearchExhausted {
        /// Asset identifier.
        asset: String,
        /// Model name.
        model: String,
    },

    /// The input frame violates ordering or leakage invariants.
    #[error("Data contract violation: {0}")]
    DataContractViolation(String),

    /// A configuration value is missing, mistyped or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A unit of work exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The unit of work was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,

    /// A model name is not present in the adapter registry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Error from Polars operations.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Error serialising or deserialising JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error writing artifacts or reading configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

impl RondaError {
    /// Returns the serialisable kind of this error.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::ModelFit(_) => FailureKind::ModelFit,
            Self::UnsupportedHorizon { .. } => FailureKind::UnsupportedHorizon,
            Self::SearchExhausted { .. } => FailureKind::SearchExhausted,
            Self::DataContractViolation(_) => FailureKind::DataContract,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            Self::InvalidConfig(_) => FailureKind::InvalidConfig,
            Self::UnknownModel(_)
            | Self::Polars(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Other(_) => FailureKind::Other,
        }
    }

    /// Whether the failure is local to one fold and may be recorded as data.
    pub const fn is_fold_local(&self) -> bool {
        matches!(self, Self::ModelFit(_) | Self::Timeout(_))
    }
}

impl From<String> for RondaError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for RondaError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

/// Failure tag stored inside fold, trial and leaderboard records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Training failed.
    ModelFit,
    /// Horizon not servable.
    UnsupportedHorizon,
    /// Search produced no viable configuration.
    SearchExhausted,
    /// Input frame rejected.
    DataContract,
    /// Work exceeded its time budget.
    Timeout,
    /// Work was cancelled.
    Cancelled,
    /// Configuration rejected.
    InvalidConfig,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Stable lowercase name used in flat records.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ModelFit => "model_fit",
            Self::UnsupportedHorizon => "unsupported_horizon",
            Self::SearchExhausted => "search_exhausted",
            Self::DataContract => "data_contract",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid_config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specialized Result type for ronda operations.
pub type Result<T> = std::result::Result<T, RondaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RondaError::ModelFit("only 3 rows".to_string());
        assert_eq!(err.to_string(), "Model fit failed: only 3 rows");

        let err = RondaError::UnsupportedHorizon {
            requested: 10,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported horizon: requested 10 steps, adapter supports at most 5"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            RondaError::ModelFit(String::new()).kind(),
            FailureKind::ModelFit
        );
        assert_eq!(
            RondaError::DataContractViolation(String::new()).kind(),
            FailureKind::DataContract
        );
        assert_eq!(RondaError::from("boom").kind(), FailureKind::Other);
    }

    #[test]
    fn test_fold_local() {
        assert!(RondaError::ModelFit(String::new()).is_fold_local());
        assert!(RondaError::Timeout(Duration::from_secs(1)).is_fold_local());
        assert!(!RondaError::UnsupportedHorizon { requested: 2, max: 1 }.is_fold_local());
        assert!(!RondaError::Cancelled.is_fold_local());
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::UnsupportedHorizon).unwrap();
        assert_eq!(json, "\"unsupported_horizon\"");
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
    }
}
