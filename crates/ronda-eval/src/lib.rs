//! Walk-forward validation and metric aggregation for ronda.
//!
//! This crate provides the leakage-free evaluation protocol shared by every
//! model family:
//! - Rolling-origin fold generation (expanding or rolling windows, embargo gaps)
//! - In-fold feature selection on training rows only
//! - Fold execution with per-fold timeouts and failure recording
//! - Regression and classification fold metrics
//! - Cross-fold aggregation into a [`MetricSummary`]
//!
//! # Example
//!
//! ```rust,ignore
//! use ronda_eval::{FoldPolicy, ValidatorConfig, WalkForwardValidator};
//!
//! let validator = WalkForwardValidator::new(ValidatorConfig::with_policy(
//!     FoldPolicy::expanding(60, 5, 5),
//! ));
//! let run = validator.run(&frame, &adapter, &config)?;
//! println!("{} folds, mean RMSE {:?}", run.folds.len(), run.summary().mean(Metric::Rmse));
//! ```

pub mod aggregate;
pub mod execution;
pub mod metrics;
pub mod selection;
pub mod walkforward;

// Re-export main types
pub use aggregate::{MetricStat, MetricSummary, SummaryStatus};
pub use execution::{
    FoldControl, FoldOutcome, FoldResult, ValidatorConfig, WalkForwardRun, WalkForwardValidator,
};
pub use metrics::{
    ClassMetrics, Direction, FoldMetrics, Metric, MetricsConfig, classification_metrics,
    regression_metrics, roc_auc,
};
pub use selection::FeatureSelection;
pub use walkforward::{Fold, FoldPolicy, WindowKind};
