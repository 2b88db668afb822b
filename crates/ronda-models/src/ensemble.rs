//! Tree ensembles over engineered features (XGBoost, LightGBM, CatBoost, Random Forest).
//!
//! The adapter hands the estimator a plain feature matrix of the training rows
//! (already restricted to the fold's selected columns) and checks what comes
//! back: finite values, one row per request, probability rows summing to one.

use std::fmt;

use ndarray::{Array2, ArrayView1, Axis};
use ronda_traits::{
    Capability, FittedModel, FrameView, Horizon, ModelAdapter, ModelConfiguration, ModelFamily,
    Prediction, Result, RondaError, SearchSpace, Task,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Training target handed to a tabular estimator.
#[derive(Debug, Clone, Copy)]
pub enum TabularTarget<'a> {
    /// Continuous regression target.
    Continuous(ArrayView1<'a, f64>),
    /// Class labels.
    Labels {
        /// Label per row.
        labels: ArrayView1<'a, usize>,
        /// Number of classes of the frame.
        n_classes: usize,
    },
}

/// Builds tabular estimators from a configuration.
pub trait TabularEstimatorFactory: Send + Sync + fmt::Debug {
    /// Trained model type.
    type Model: TabularModel + 'static;

    /// Model name, e.g. `"xgboost"` or `"random_forest"`.
    fn name(&self) -> &str;

    /// Regression or classification.
    fn task(&self) -> Task;

    /// Whether trained models report quantile intervals.
    fn quantile_capable(&self) -> bool {
        false
    }

    /// Fewest training rows the estimator accepts.
    fn min_rows(&self, _config: &ModelConfiguration) -> usize {
        10
    }

    /// Default configuration space (tree depth, learning rate, rounds, ...).
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
    }

    /// Trains on the feature matrix. Stochastic estimators read their seed
    /// with [`ModelConfiguration::seed`].
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when training fails.
    fn train(
        &self,
        features: &Array2<f64>,
        target: TabularTarget<'_>,
        config: &ModelConfiguration,
    ) -> Result<Self::Model>;
}

/// A trained tabular model.
pub trait TabularModel: Send + Sync + fmt::Debug {
    /// Predicts one row per feature row: point values (with intervals when
    /// quantile capable) for regression, probabilities for classification.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when inference fails.
    fn predict(&self, features: &Array2<f64>) -> Result<Prediction>;
}

/// Configuration for [`TreeEnsembleAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Longest horizon the feature set supports (default: 1).
    ///
    /// Tabular models predict each row from its own features, so horizons
    /// above one are only meaningful when the features were engineered for them.
    pub max_horizon: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { max_horizon: 1 }
    }
}

/// Adapter for tree-ensemble estimators.
#[derive(Debug, Clone)]
pub struct TreeEnsembleAdapter<F> {
    factory: F,
    config: EnsembleConfig,
}

impl<F: TabularEstimatorFactory> TreeEnsembleAdapter<F> {
    /// Creates an adapter around `factory`.
    #[must_use]
    pub const fn new(factory: F, config: EnsembleConfig) -> Self {
        Self { factory, config }
    }

    /// Creates an adapter with the default configuration.
    #[must_use]
    pub fn with_defaults(factory: F) -> Self {
        Self::new(factory, EnsembleConfig::default())
    }
}

impl<F: TabularEstimatorFactory> ModelAdapter for TreeEnsembleAdapter<F> {
    fn name(&self) -> &str {
        self.factory.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::TreeEnsemble
    }

    fn task(&self) -> Task {
        self.factory.task()
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::PointForecast => self.factory.task() == Task::Regression,
            Capability::PredictionInterval => {
                self.factory.task() == Task::Regression && self.factory.quantile_capable()
            }
            Capability::ClassProbabilities => self.factory.task() == Task::Classification,
            Capability::MultiStep => self.config.max_horizon > 1,
            Capability::Stochastic => true,
        }
    }

    fn min_train_len(&self, config: &ModelConfiguration) -> usize {
        self.factory.min_rows(config)
    }

    fn max_horizon(&self) -> Option<usize> {
        Some(self.config.max_horizon)
    }

    fn default_space(&self) -> SearchSpace {
        self.factory.default_space()
    }

    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        if train.task() != self.factory.task() {
            return Err(RondaError::InvalidConfig(format!(
                "{} is a {} model, frame target is {}",
                self.name(),
                self.factory.task().as_str(),
                train.task().as_str()
            )));
        }
        train.ensure_trainable(self.min_train_len(config))?;

        let features = train.features();
        let target = match train.task() {
            Task::Regression => TabularTarget::Continuous(train.continuous_target()?),
            Task::Classification => TabularTarget::Labels {
                labels: train.labels()?,
                n_classes: train.n_classes().unwrap_or(2),
            },
        };
        let model = self.factory.train(&features, target, config)?;
        debug!(
            asset = train.asset(),
            model = self.name(),
            rows = features.nrows(),
            features = features.ncols(),
            "fitted tabular model"
        );

        Ok(Box::new(FittedTabular {
            model,
            task: self.factory.task(),
        }))
    }
}

#[derive(Debug)]
struct FittedTabular<M> {
    model: M,
    task: Task,
}

impl<M: TabularModel> FittedModel for FittedTabular<M> {
    fn predict(&self, view: &FrameView<'_>, _horizon: Horizon) -> Result<Prediction> {
        let features = view.features();
        if let Some(((row, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(RondaError::ModelFit(format!(
                "{}: non-finite feature at prediction row {row}, column {col}",
                view.asset()
            )));
        }

        match (self.task, self.model.predict(&features)?) {
            (Task::Regression, Prediction::Point { values, intervals }) => {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(RondaError::ModelFit(
                        "estimator returned non-finite predictions".to_string(),
                    ));
                }
                Ok(Prediction::Point { values, intervals })
            }
            (Task::Classification, Prediction::Classes { probabilities, .. }) => {
                let expected = view.n_classes().unwrap_or(2);
                if probabilities.ncols() != expected {
                    return Err(RondaError::ModelFit(format!(
                        "estimator returned {} class columns, expected {expected}",
                        probabilities.ncols()
                    )));
                }
                Ok(Prediction::from_probabilities(normalize_rows(probabilities)?))
            }
            (task, _) => Err(RondaError::ModelFit(format!(
                "estimator output does not match a {} task",
                task.as_str()
            ))),
        }
    }
}

/// Rescales each probability row to sum to one.
fn normalize_rows(mut probabilities: Array2<f64>) -> Result<Array2<f64>> {
    for (i, mut row) in probabilities.axis_iter_mut(Axis(0)).enumerate() {
        let total: f64 = row.sum();
        if !total.is_finite() || total <= 0.0 || row.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(RondaError::ModelFit(format!(
                "invalid class probabilities at row {i}"
            )));
        }
        row.mapv_inplace(|p| p / total);
    }
    Ok(probabilities)
}
