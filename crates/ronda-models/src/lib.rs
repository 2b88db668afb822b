//! Model family adapters for the ronda walk-forward engine.
//!
//! This crate wraps heterogeneous model families behind the
//! [`ModelAdapter`](ronda_traits::ModelAdapter) contract:
//! - Statistical: ARIMA-style series models ([`StatisticalAdapter`], [`Autoregressive`])
//! - Tree ensembles: XGBoost/LightGBM/CatBoost/Random Forest ([`TreeEnsembleAdapter`])
//! - Deep sequence: LSTM-style recurrent networks ([`SequenceAdapter`])
//! - Markov: regime chains and hidden Markov models ([`MarkovChainAdapter`], [`HiddenMarkovAdapter`])
//!
//! Each adapter owns the walk-forward plumbing of its family; the training
//! algorithm itself sits behind an estimator trait supplied by the caller.
//!
//! # Example
//!
//! ```
//! use ronda_models::registry::AdapterRegistry;
//! use ronda_models::{Autoregressive, MarkovChainAdapter, StatisticalAdapter};
//!
//! let registry = AdapterRegistry::new()
//!     .with(StatisticalAdapter::with_defaults(Autoregressive))
//!     .unwrap()
//!     .with(MarkovChainAdapter::default())
//!     .unwrap();
//! assert_eq!(registry.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod ensemble;
mod linalg;
pub mod markov;
pub mod registry;
pub mod sequence;
pub mod statistical;

// Re-export key types
pub use ensemble::{TabularEstimatorFactory, TabularModel, TabularTarget, TreeEnsembleAdapter};
pub use markov::{GaussianHmmParams, HiddenMarkovAdapter, HiddenStateEstimator, MarkovChainAdapter};
pub use registry::{AdapterInfo, AdapterRegistry};
pub use sequence::{RecurrentEstimator, RecurrentNetwork, SequenceAdapter};
pub use statistical::{Autoregressive, SeriesEstimator, SeriesForecaster, StatisticalAdapter};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, NaiveDate};
    use ndarray::{Array1, Array2};
    use ronda_traits::{Target, TimeSeriesFrame};

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    /// Target-only frame.
    pub(crate) fn series_frame(values: &[f64]) -> TimeSeriesFrame {
        TimeSeriesFrame::new(
            "TEST",
            dates(values.len()),
            vec![],
            Array2::zeros((values.len(), 0)),
            Target::Continuous(Array1::from_vec(values.to_vec())),
        )
        .unwrap()
    }

    /// Two features with a target that is exactly linear in them.
    pub(crate) fn regression_frame(n: usize) -> TimeSeriesFrame {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| match j {
            0 => (i as f64 * 0.3).sin(),
            _ => (i % 7) as f64,
        });
        let target = Array1::from_shape_fn(n, |i| 1.0 + 2.0 * features[[i, 0]] - 0.5 * features[[i, 1]]);
        TimeSeriesFrame::new(
            "TEST",
            dates(n),
            vec!["wave".to_string(), "cycle".to_string()],
            features,
            Target::Continuous(target),
        )
        .unwrap()
    }

    /// One feature; the label is whether it is positive.
    pub(crate) fn classification_frame(n: usize) -> TimeSeriesFrame {
        let features = Array2::from_shape_fn((n, 1), |(i, _)| (i as f64 * 0.7).sin());
        let labels = Array1::from_shape_fn(n, |i| usize::from(features[[i, 0]] > 0.0));
        TimeSeriesFrame::new(
            "TEST",
            dates(n),
            vec!["signal".to_string()],
            features,
            Target::Categorical {
                labels,
                n_classes: 2,
            },
        )
        .unwrap()
    }
}
