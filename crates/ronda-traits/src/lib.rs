#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ronda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

//! Core contracts for the ronda walk-forward evaluation engine.
//!
//! This crate provides the data model shared by every other ronda crate: the
//! validated [`TimeSeriesFrame`], the [`ModelAdapter`] contract that every
//! model family implements, model configurations and their search spaces,
//! and the error taxonomy.

/// The version of the ronda-traits crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Module declarations
pub mod adapter;
pub mod config;
pub mod error;
pub mod frame;
pub mod space;
pub mod stats;
pub mod types;

// Re-exports
pub use adapter::{
    Capability, FittedModel, Horizon, Interval, ModelAdapter, Prediction, check_horizon,
};
pub use config::{FEATURE_TOP_K_KEY, ModelConfiguration, ParamValue, SEED_KEY, TRAIN_WINDOW_KEY};
pub use error::{FailureKind, Result, RondaError};
pub use frame::{FrameColumns, FrameView, Target, TimeSeriesFrame};
pub use space::{ParamSpec, SearchSpace};
pub use types::{AssetId, Date, ModelFamily, Task};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }
}
