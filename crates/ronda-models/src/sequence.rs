//! Recurrent sequence models (LSTM and relatives) over lookback windows.
//!
//! The adapter turns a training view into overlapping windows of
//! `lookback` rows, each row holding the scaled features followed by the
//! scaled target. Scaling statistics come from the training rows only. The
//! final `lookback` training rows are kept as the warm-up buffer, so the first
//! validation prediction is conditioned on the end of training and nothing
//! after it.

use std::fmt;

use ndarray::{Array1, Array2, Array3, ArrayView2};
use ronda_traits::stats::{StandardizeResult, standardize};
use ronda_traits::{
    Capability, FittedModel, FrameView, Horizon, ModelAdapter, ModelConfiguration, ModelFamily,
    Prediction, Result, RondaError, SearchSpace, Task,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration key for the window length.
pub const LOOKBACK_KEY: &str = "lookback";

/// Trains a recurrent network on lookback windows.
pub trait RecurrentEstimator: Send + Sync + fmt::Debug {
    /// Trained network type.
    type Network: RecurrentNetwork + 'static;

    /// Model name, e.g. `"lstm"`.
    fn name(&self) -> &str;

    /// Fewest training windows accepted.
    fn min_samples(&self) -> usize {
        8
    }

    /// Default configuration space (units, layers, dropout, epochs, lookback).
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
    }

    /// Trains on `windows` of shape `(samples, lookback, channels)`; the last
    /// channel is the scaled target. `targets[k]` is the scaled target that
    /// follows window `k`. The seed comes from [`ModelConfiguration::seed`].
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when training diverges or fails.
    fn train(
        &self,
        windows: &Array3<f64>,
        targets: &Array1<f64>,
        config: &ModelConfiguration,
    ) -> Result<Self::Network>;
}

/// A trained recurrent network.
pub trait RecurrentNetwork: Send + Sync + fmt::Debug {
    /// Maps one `(lookback, channels)` window to the next scaled target.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when inference fails.
    fn forward(&self, window: ArrayView2<'_, f64>) -> Result<f64>;
}

/// Configuration for [`SequenceAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Window length used when the configuration has no `lookback` (default: 10).
    pub default_lookback: usize,
    /// Longest recursive horizon served; `None` is unbounded.
    pub max_horizon: Option<usize>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            default_lookback: 10,
            max_horizon: None,
        }
    }
}

/// Adapter for recurrent sequence models.
#[derive(Debug, Clone)]
pub struct SequenceAdapter<N> {
    estimator: N,
    config: SequenceConfig,
}

impl<N: RecurrentEstimator> SequenceAdapter<N> {
    /// Creates an adapter around `estimator`.
    #[must_use]
    pub const fn new(estimator: N, config: SequenceConfig) -> Self {
        Self { estimator, config }
    }

    /// Creates an adapter with the default configuration.
    #[must_use]
    pub fn with_defaults(estimator: N) -> Self {
        Self::new(estimator, SequenceConfig::default())
    }

    /// Sets the longest horizon served.
    #[must_use]
    pub const fn with_max_horizon(mut self, max_horizon: Option<usize>) -> Self {
        self.config.max_horizon = max_horizon;
        self
    }

    fn lookback(&self, config: &ModelConfiguration) -> Result<usize> {
        let lookback = config.usize_or(LOOKBACK_KEY, self.config.default_lookback)?;
        if lookback == 0 {
            return Err(RondaError::InvalidConfig(
                "lookback must be at least 1".to_string(),
            ));
        }
        Ok(lookback)
    }
}

impl<N: RecurrentEstimator> ModelAdapter for SequenceAdapter<N> {
    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::DeepSequence
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::PointForecast | Capability::Stochastic => true,
            Capability::MultiStep => self.config.max_horizon.is_none_or(|h| h > 1),
            Capability::PredictionInterval | Capability::ClassProbabilities => false,
        }
    }

    fn min_train_len(&self, config: &ModelConfiguration) -> usize {
        self.lookback(config)
            .unwrap_or(self.config.default_lookback)
            + self.estimator.min_samples()
    }

    fn max_horizon(&self) -> Option<usize> {
        self.config.max_horizon
    }

    fn default_space(&self) -> SearchSpace {
        self.estimator.default_space()
    }

    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        let lookback = self.lookback(config)?;
        train.ensure_trainable(lookback + self.estimator.min_samples())?;

        let raw = channels(&train.features(), &train.continuous_target()?.to_vec());
        let n_channels = raw.ncols();
        let scalers: Vec<StandardizeResult> = (0..n_channels)
            .map(|c| standardize(&raw.column(c).to_vec()).1)
            .collect();
        let scaled = Array2::from_shape_fn(raw.dim(), |(r, c)| scalers[c].apply(raw[[r, c]]));

        let samples = scaled.nrows() - lookback;
        let windows = Array3::from_shape_fn((samples, lookback, n_channels), |(k, r, c)| {
            scaled[[k + r, c]]
        });
        let targets = Array1::from_shape_fn(samples, |k| scaled[[k + lookback, n_channels - 1]]);

        let network = self.estimator.train(&windows, &targets, config)?;
        debug!(
            asset = train.asset(),
            model = self.name(),
            lookback,
            samples,
            "trained sequence model"
        );

        let buffer = (scaled.nrows() - lookback..scaled.nrows())
            .map(|r| scaled.row(r).to_vec())
            .collect();

        Ok(Box::new(FittedSequence {
            network,
            scalers,
            lookback,
            buffer,
        }))
    }
}

/// Feature columns followed by the target column.
fn channels(features: &Array2<f64>, target: &[f64]) -> Array2<f64> {
    let f = features.ncols();
    Array2::from_shape_fn((features.nrows(), f + 1), |(r, c)| {
        if c < f { features[[r, c]] } else { target[r] }
    })
}

#[derive(Debug)]
struct FittedSequence<T> {
    network: T,
    scalers: Vec<StandardizeResult>,
    lookback: usize,
    buffer: Vec<Vec<f64>>,
}

impl<T> FittedSequence<T> {
    fn scale_row(&self, features: &[f64], target: f64) -> Vec<f64> {
        let target_channel = self.scalers.len() - 1;
        features
            .iter()
            .chain(std::iter::once(&target))
            .enumerate()
            .map(|(c, v)| {
                if c == target_channel {
                    *v
                } else {
                    self.scalers[c].apply(*v)
                }
            })
            .collect()
    }

    fn window(&self, history: &[Vec<f64>]) -> Array2<f64> {
        let start = history.len() - self.lookback;
        Array2::from_shape_fn((self.lookback, self.scalers.len()), |(r, c)| {
            history[start + r][c]
        })
    }
}

impl<T: RecurrentNetwork> FittedModel for FittedSequence<T> {
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
        let features = view.features();
        if features.iter().any(|v| !v.is_finite()) {
            return Err(RondaError::ModelFit(format!(
                "{}: non-finite features in prediction window",
                view.asset()
            )));
        }
        let target_scaler = self.scalers[self.scalers.len() - 1];
        let actuals = view.continuous_target()?;

        let mut history = self.buffer.clone();
        let mut values = Vec::with_capacity(view.len());
        let mut observed = 0;

        for block in horizon.blocks(view.len()) {
            for row in observed..block.start {
                let y = target_scaler.apply(actuals[row]);
                history.push(self.scale_row(&features.row(row).to_vec(), y));
            }
            observed = block.start;

            let committed = history.len();
            for row in block {
                let scaled = self.network.forward(self.window(&history).view())?;
                if !scaled.is_finite() {
                    return Err(RondaError::ModelFit(
                        "network produced a non-finite output".to_string(),
                    ));
                }
                values.push(target_scaler.invert(scaled));
                history.push(self.scale_row(&features.row(row).to_vec(), scaled));
            }
            // recursive rows are replaced by actuals once the block is over
            history.truncate(committed);
        }

        Ok(Prediction::point(Array1::from_vec(values)))
    }
}
