//! The uniform fit/predict contract every model family implements.
//!
//! The walk-forward validator, the search and the ranking engine only ever
//! talk to a [`ModelAdapter`]. Family-specific state (lag buffers, recurrent
//! warm-up windows, hidden-state posteriors) lives inside the boxed
//! [`FittedModel`] an adapter returns and never leaks through this interface.

use std::fmt;
use std::ops::Range;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{FrameView, ModelConfiguration, ModelFamily, Result, RondaError, SearchSpace, Task};

/// Optional behaviour an adapter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produces point forecasts.
    PointForecast,
    /// Produces lower/upper prediction intervals.
    PredictionInterval,
    /// Produces class probabilities.
    ClassProbabilities,
    /// Serves horizons longer than one step without retraining.
    MultiStep,
    /// Output depends on a seed; the seed is read from the configuration.
    Stochastic,
}

/// How far ahead each validation row is predicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    /// Row `i` is predicted from information up to row `i - 1`.
    #[default]
    OneStep,
    /// Rows are predicted recursively in blocks of `h` steps; within a block
    /// no actual of that block is observed.
    MultiStep(usize),
}

impl Horizon {
    /// Steps ahead predicted from one origin.
    pub const fn steps(&self) -> usize {
        match self {
            Self::OneStep => 1,
            Self::MultiStep(h) => *h,
        }
    }

    /// Fails with [`RondaError::InvalidConfig`] for a zero-step horizon.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn validate(&self) -> Result<()> {
        if self.steps() == 0 {
            return Err(RondaError::InvalidConfig(
                "multi-step horizon must be at least one step".into(),
            ));
        }
        Ok(())
    }

    /// Splits `len` prediction rows into forecast blocks.
    ///
    /// Each block is forecast from its start: actual targets of rows before
    /// `block.start` are observable, rows inside the block are not.
    ///
    /// ```
    /// use ronda_traits::Horizon;
    ///
    /// assert_eq!(Horizon::MultiStep(2).blocks(5), vec![0..2, 2..4, 4..5]);
    /// assert_eq!(Horizon::OneStep.blocks(2), vec![0..1, 1..2]);
    /// ```
    pub fn blocks(&self, len: usize) -> Vec<Range<usize>> {
        let step = self.steps().max(1);
        (0..len)
            .step_by(step)
            .map(|start| start..(start + step).min(len))
            .collect()
    }
}

/// A two-sided prediction interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

/// Output of one prediction call, one entry per requested row.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Continuous forecasts, with intervals when the family supports them.
    Point {
        /// Point forecasts.
        values: Array1<f64>,
        /// Optional interval per forecast.
        intervals: Option<Vec<Interval>>,
    },
    /// Class probabilities and the arg-max labels.
    Classes {
        /// Rows are predictions, columns are classes; rows sum to one.
        probabilities: Array2<f64>,
        /// Hard label per row.
        labels: Array1<usize>,
    },
}

impl Prediction {
    /// Point forecasts without intervals.
    pub const fn point(values: Array1<f64>) -> Self {
        Self::Point {
            values,
            intervals: None,
        }
    }

    /// Class prediction whose hard labels are the row-wise arg-max.
    ///
    /// Ties resolve to the lowest class index.
    pub fn from_probabilities(probabilities: Array2<f64>) -> Self {
        let labels = probabilities
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 { (i, p) } else { best }
                    })
                    .0
            })
            .collect();
        Self::Classes {
            probabilities,
            labels,
        }
    }

    /// Number of predicted rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Point { values, .. } => values.len(),
            Self::Classes { labels, .. } => labels.len(),
        }
    }

    /// Whether nothing was predicted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point forecasts as `f64` (hard labels for class predictions).
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Point { values, .. } => values.to_vec(),
            Self::Classes { labels, .. } => labels.iter().map(|&l| l as f64).collect(),
        }
    }
}

/// A model trained on one window, ready to predict the rows that follow it.
pub trait FittedModel: Send + fmt::Debug {
    /// Predicts every row of `view` under `horizon`.
    ///
    /// `view` covers the validation rows. Under [`Horizon::blocks`] semantics
    /// an implementation may read actual targets of rows before the current
    /// block start and never those of the current block or later.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when the model cannot produce a
    /// prediction (for example non-finite inputs).
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction>;
}

/// Uniform contract over heterogeneous model families.
///
/// # Implementing an adapter
///
/// ```
/// use ndarray::Array1;
/// use ronda_traits::{
///     Capability, FittedModel, FrameView, Horizon, ModelAdapter, ModelConfiguration,
///     ModelFamily, Prediction, Result, Task,
/// };
///
/// #[derive(Debug)]
/// struct LastValue;
///
/// #[derive(Debug)]
/// struct FittedLastValue(f64);
///
/// impl FittedModel for FittedLastValue {
///     fn predict(&self, view: &FrameView<'_>, _horizon: Horizon) -> Result<Prediction> {
///         Ok(Prediction::point(Array1::from_elem(view.len(), self.0)))
///     }
/// }
///
/// impl ModelAdapter for LastValue {
///     fn name(&self) -> &str {
///         "last_value"
///     }
///     fn family(&self) -> ModelFamily {
///         ModelFamily::Statistical
///     }
///     fn task(&self) -> Task {
///         Task::Regression
///     }
///     fn supports(&self, capability: Capability) -> bool {
///         matches!(capability, Capability::PointForecast)
///     }
///     fn min_train_len(&self, _config: &ModelConfiguration) -> usize {
///         1
///     }
///     fn max_horizon(&self) -> Option<usize> {
///         Some(1)
///     }
///     fn fit(
///         &self,
///         train: &FrameView<'_>,
///         _config: &ModelConfiguration,
///     ) -> Result<Box<dyn FittedModel>> {
///         let y = train.continuous_target()?;
///         Ok(Box::new(FittedLastValue(y[y.len() - 1])))
///     }
/// }
/// ```
pub trait ModelAdapter: Send + Sync + fmt::Debug {
    /// Unique model name, e.g. `"arima"` or `"xgboost"`.
    fn name(&self) -> &str;

    /// Family the model belongs to.
    fn family(&self) -> ModelFamily;

    /// Regression or classification.
    fn task(&self) -> Task;

    /// Whether a capability is declared.
    fn supports(&self, capability: Capability) -> bool;

    /// Smallest training window the family can fit under `config`.
    fn min_train_len(&self, config: &ModelConfiguration) -> usize;

    /// Longest horizon served without retraining; `None` is unbounded.
    fn max_horizon(&self) -> Option<usize> {
        None
    }

    /// Default configuration space explored by the search.
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
    }

    /// Trains on `train`.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when `train` is shorter than
    /// [`min_train_len`](Self::min_train_len), contains non-finite values, or
    /// the wrapped estimator fails.
    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>>;

    /// Predicts `view` with a fitted model.
    ///
    /// The default implementation checks the horizon and the output length and
    /// otherwise delegates to [`FittedModel::predict`].
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnsupportedHorizon`] when `horizon` exceeds
    /// [`max_horizon`](Self::max_horizon), and [`RondaError::ModelFit`] when the
    /// fitted model returns the wrong number of rows.
    fn predict(
        &self,
        model: &dyn FittedModel,
        view: &FrameView<'_>,
        horizon: Horizon,
    ) -> Result<Prediction> {
        check_horizon(self.max_horizon(), horizon)?;
        let prediction = model.predict(view, horizon)?;
        if prediction.len() != view.len() {
            return Err(RondaError::ModelFit(format!(
                "{} returned {} predictions for {} rows",
                self.name(),
                prediction.len(),
                view.len()
            )));
        }
        Ok(prediction)
    }
}

/// Fails with [`RondaError::UnsupportedHorizon`] when `horizon` exceeds `max`
/// and with [`RondaError::InvalidConfig`] when it has no steps.
///
/// # Errors
///
/// See above.
pub fn check_horizon(max: Option<usize>, horizon: Horizon) -> Result<()> {
    horizon.validate()?;
    match max {
        Some(max) if horizon.steps() > max => Err(RondaError::UnsupportedHorizon {
            requested: horizon.steps(),
            max,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Date, Target, TimeSeriesFrame};
    use approx::assert_relative_eq;
    use ndarray::array;

    #[derive(Debug)]
    struct MeanAdapter;

    #[derive(Debug)]
    struct FittedMean {
        mean: f64,
        rows: Option<usize>,
    }

    impl FittedModel for FittedMean {
        fn predict(&self, view: &FrameView<'_>, _horizon: Horizon) -> Result<Prediction> {
            let n = self.rows.unwrap_or_else(|| view.len());
            Ok(Prediction::point(Array1::from_elem(n, self.mean)))
        }
    }

    impl ModelAdapter for MeanAdapter {
        fn name(&self) -> &str {
            "mean"
        }
        fn family(&self) -> ModelFamily {
            ModelFamily::Statistical
        }
        fn task(&self) -> Task {
            Task::Regression
        }
        fn supports(&self, capability: Capability) -> bool {
            matches!(capability, Capability::PointForecast | Capability::MultiStep)
        }
        fn min_train_len(&self, _config: &ModelConfiguration) -> usize {
            2
        }
        fn max_horizon(&self) -> Option<usize> {
            Some(3)
        }
        fn fit(
            &self,
            train: &FrameView<'_>,
            config: &ModelConfiguration,
        ) -> Result<Box<dyn FittedModel>> {
            train.ensure_trainable(self.min_train_len(config))?;
            let y = train.continuous_target()?;
            Ok(Box::new(FittedMean {
                mean: y.mean().unwrap_or(0.0),
                rows: config.get("rows").and_then(|v| v.as_i64()).map(|v| v as usize),
            }))
        }
    }

    fn frame() -> TimeSeriesFrame {
        let start = Date::from_ymd_opt(2024, 1, 1).unwrap();
        let stamps = (0..6).map(|i| start + chrono::Duration::days(i)).collect();
        TimeSeriesFrame::new(
            "T",
            stamps,
            vec![],
            Array2::zeros((6, 0)),
            Target::Continuous(array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_fit_and_predict() {
        let f = frame();
        let adapter = MeanAdapter;
        let config = ModelConfiguration::new();
        let model = adapter.fit(&f.view(0..4).unwrap(), &config).unwrap();
        let pred = adapter
            .predict(model.as_ref(), &f.view(4..6).unwrap(), Horizon::OneStep)
            .unwrap();
        assert_eq!(pred.len(), 2);
        assert_relative_eq!(pred.values()[0], 2.5);
    }

    #[test]
    fn test_fit_rejects_short_window() {
        let f = frame();
        let result = MeanAdapter.fit(&f.view(0..1).unwrap(), &ModelConfiguration::new());
        assert!(matches!(result, Err(RondaError::ModelFit(_))));
    }

    #[test]
    fn test_unsupported_horizon() {
        let f = frame();
        let adapter = MeanAdapter;
        let model = adapter
            .fit(&f.view(0..4).unwrap(), &ModelConfiguration::new())
            .unwrap();
        let result = adapter.predict(model.as_ref(), &f.view(4..6).unwrap(), Horizon::MultiStep(5));
        assert!(matches!(
            result,
            Err(RondaError::UnsupportedHorizon {
                requested: 5,
                max: 3
            })
        ));
    }

    #[test]
    fn test_wrong_prediction_length() {
        let f = frame();
        let adapter = MeanAdapter;
        let config = ModelConfiguration::new().with("rows", 1_i64);
        let model = adapter.fit(&f.view(0..4).unwrap(), &config).unwrap();
        let result = adapter.predict(model.as_ref(), &f.view(4..6).unwrap(), Horizon::OneStep);
        assert!(matches!(result, Err(RondaError::ModelFit(_))));
    }

    #[test]
    fn test_zero_step_horizon_rejected() {
        assert!(matches!(
            check_horizon(None, Horizon::MultiStep(0)),
            Err(RondaError::InvalidConfig(_))
        ));
        assert!(matches!(
            check_horizon(Some(3), Horizon::MultiStep(0)),
            Err(RondaError::InvalidConfig(_))
        ));
        assert!(check_horizon(None, Horizon::MultiStep(1)).is_ok());
        assert!(Horizon::OneStep.validate().is_ok());
    }

    #[test]
    fn test_blocks() {
        assert_eq!(Horizon::MultiStep(3).blocks(7), vec![0..3, 3..6, 6..7]);
        assert_eq!(Horizon::MultiStep(10).blocks(4), vec![0..4]);
        assert!(Horizon::OneStep.blocks(0).is_empty());
    }

    #[test]
    fn test_from_probabilities_argmax() {
        let probs = array![[0.2, 0.8], [0.6, 0.4], [0.5, 0.5]];
        match Prediction::from_probabilities(probs) {
            Prediction::Classes { labels, .. } => assert_eq!(labels.to_vec(), vec![1, 0, 0]),
            Prediction::Point { .. } => panic!("expected classes"),
        }
    }
}
