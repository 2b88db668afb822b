//! Classical univariate series models (ARIMA, Prophet and relatives).
//!
//! [`StatisticalAdapter`] owns everything the walk-forward contract needs:
//! extracting the training series, feeding observed validation actuals back
//! into the history between forecast blocks, and turning residual dispersion
//! into prediction intervals. The estimator behind it only maps a history to
//! a forecast.

use std::fmt;

use ndarray::{Array1, Array2, s};
use ronda_traits::{
    Capability, FittedModel, FrameView, Horizon, Interval, ModelAdapter, ModelConfiguration,
    ModelFamily, Prediction, Result, RondaError, SearchSpace, Task,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::linalg::least_squares;

/// Configuration key for the autoregressive order `p`.
pub const ORDER_KEY: &str = "order";

/// Configuration key for the differencing order `d`.
pub const DIFFERENCE_KEY: &str = "difference";

/// Configuration key for the ridge penalty on lag coefficients.
pub const RIDGE_KEY: &str = "ridge";

/// A univariate estimator producing a [`SeriesForecaster`].
pub trait SeriesEstimator: Send + Sync + fmt::Debug {
    /// Forecaster produced by [`estimate`](Self::estimate).
    type Forecaster: SeriesForecaster + 'static;

    /// Model name used in registries and leaderboards.
    fn name(&self) -> &str;

    /// Shortest series the estimator can fit under `config`.
    fn min_observations(&self, config: &ModelConfiguration) -> usize;

    /// Default configuration space.
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
    }

    /// Fits the estimator on `series`.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when estimation fails and
    /// [`RondaError::InvalidConfig`] for unusable configuration values.
    fn estimate(&self, series: &[f64], config: &ModelConfiguration) -> Result<Self::Forecaster>;
}

/// A fitted univariate model.
pub trait SeriesForecaster: Send + Sync + fmt::Debug {
    /// Forecasts `steps` values following `history`.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when `history` is too short.
    fn forecast(&self, history: &[f64], steps: usize) -> Result<Vec<f64>>;

    /// One-step residual standard deviation, when the model has one.
    fn residual_std(&self) -> Option<f64> {
        None
    }
}

/// Configuration for [`StatisticalAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalConfig {
    /// Longest horizon served; `None` for unbounded recursive forecasting.
    pub max_horizon: Option<usize>,
    /// Normal quantile for prediction intervals (default: 1.96, i.e. 95%).
    pub interval_z: f64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            max_horizon: None,
            interval_z: 1.96,
        }
    }
}

/// Adapter for classical series models.
///
/// # Example
///
/// ```
/// use ronda_models::statistical::{Autoregressive, StatisticalAdapter};
/// use ronda_traits::{ModelAdapter, ModelFamily};
///
/// let adapter = StatisticalAdapter::with_defaults(Autoregressive);
/// assert_eq!(adapter.name(), "arima");
/// assert_eq!(adapter.family(), ModelFamily::Statistical);
/// ```
#[derive(Debug, Clone)]
pub struct StatisticalAdapter<E> {
    estimator: E,
    config: StatisticalConfig,
}

impl<E: SeriesEstimator> StatisticalAdapter<E> {
    /// Creates an adapter around `estimator`.
    #[must_use]
    pub const fn new(estimator: E, config: StatisticalConfig) -> Self {
        Self { estimator, config }
    }

    /// Creates an adapter with the default configuration.
    #[must_use]
    pub fn with_defaults(estimator: E) -> Self {
        Self::new(estimator, StatisticalConfig::default())
    }

    /// The wrapped estimator.
    pub const fn estimator(&self) -> &E {
        &self.estimator
    }
}

impl<E: SeriesEstimator> ModelAdapter for StatisticalAdapter<E> {
    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Statistical
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::PointForecast | Capability::PredictionInterval | Capability::MultiStep
        )
    }

    fn min_train_len(&self, config: &ModelConfiguration) -> usize {
        self.estimator.min_observations(config)
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
        train.ensure_trainable(self.min_train_len(config))?;
        let history = train.continuous_target()?.to_vec();
        let forecaster = self.estimator.estimate(&history, config)?;
        debug!(
            asset = train.asset(),
            model = self.name(),
            rows = history.len(),
            "fitted series model"
        );
        Ok(Box::new(FittedSeries {
            forecaster,
            history,
            interval_z: self.config.interval_z,
        }))
    }
}

#[derive(Debug)]
struct FittedSeries<F> {
    forecaster: F,
    history: Vec<f64>,
    interval_z: f64,
}

impl<F: SeriesForecaster> FittedModel for FittedSeries<F> {
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
        let actuals = view.continuous_target()?;
        let sigma = self.forecaster.residual_std().filter(|s| s.is_finite());
        let mut values = Vec::with_capacity(view.len());
        let mut intervals = sigma.map(|_| Vec::with_capacity(view.len()));
        let mut history = self.history.clone();
        let mut observed = 0;

        for block in horizon.blocks(view.len()) {
            history.extend(actuals.slice(s![observed..block.start]).iter());
            observed = block.start;

            let forecast = self.forecaster.forecast(&history, block.len())?;
            if forecast.len() != block.len() || forecast.iter().any(|v| !v.is_finite()) {
                return Err(RondaError::ModelFit(format!(
                    "{}: forecaster returned an invalid block for rows {block:?}",
                    view.asset()
                )));
            }

            if let (Some(out), Some(sigma)) = (intervals.as_mut(), sigma) {
                for (k, value) in forecast.iter().enumerate() {
                    let half = self.interval_z * sigma * ((k + 1) as f64).sqrt();
                    out.push(Interval {
                        lower: value - half,
                        upper: value + half,
                    });
                }
            }
            values.extend(forecast);
        }

        Ok(Prediction::Point {
            values: Array1::from_vec(values),
            intervals,
        })
    }
}

/// ARIMA(p, d, 0): ordinary least squares on `d`-times differenced values.
///
/// Configuration keys: `order` (p, default 1), `difference` (d, default 0),
/// `ridge` (penalty on lag coefficients, default 1e-6).
#[derive(Debug, Clone, Copy, Default)]
pub struct Autoregressive;

impl Autoregressive {
    fn orders(config: &ModelConfiguration) -> Result<(usize, usize)> {
        let p = config.usize_or(ORDER_KEY, 1)?;
        let d = config.usize_or(DIFFERENCE_KEY, 0)?;
        if p == 0 {
            return Err(RondaError::InvalidConfig(
                "autoregressive order must be at least 1".to_string(),
            ));
        }
        Ok((p, d))
    }
}

impl SeriesEstimator for Autoregressive {
    type Forecaster = AutoregressiveFit;

    fn name(&self) -> &str {
        "arima"
    }

    fn min_observations(&self, config: &ModelConfiguration) -> usize {
        let (p, d) = Self::orders(config).unwrap_or((1, 0));
        2 * p + d + 2
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
            .int(ORDER_KEY, 1, 5)
            .int(DIFFERENCE_KEY, 0, 1)
    }

    fn estimate(&self, series: &[f64], config: &ModelConfiguration) -> Result<Self::Forecaster> {
        let (p, d) = Self::orders(config)?;
        let ridge = config.f64_or(RIDGE_KEY, 1e-6)?;

        let diffed = difference(series, d);
        if diffed.len() < 2 * p + 2 {
            return Err(RondaError::ModelFit(format!(
                "ARIMA({p},{d},0) needs {} observations, got {}",
                2 * p + d + 2,
                series.len()
            )));
        }

        let rows = diffed.len() - p;
        let x = Array2::from_shape_fn((rows, p + 1), |(r, c)| {
            if c == 0 { 1.0 } else { diffed[p + r - c] }
        });
        let y = Array1::from_iter(diffed[p..].iter().copied());

        let beta = least_squares(&x, &y, ridge).ok_or_else(|| {
            RondaError::ModelFit(format!("ARIMA({p},{d},0) design matrix is singular"))
        })?;

        let fitted = x.dot(&beta);
        let sse: f64 = (&y - &fitted).iter().map(|r| r * r).sum();
        let dof = rows.saturating_sub(p + 1).max(1);

        Ok(AutoregressiveFit {
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
            difference: d,
            sigma: (sse / dof as f64).sqrt(),
        })
    }
}

/// Estimated ARIMA(p, d, 0) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoregressiveFit {
    intercept: f64,
    coefficients: Vec<f64>,
    difference: usize,
    sigma: f64,
}

impl AutoregressiveFit {
    /// Intercept of the differenced process.
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Lag coefficients, most recent lag first.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Residual standard deviation of the differenced process.
    pub const fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl SeriesForecaster for AutoregressiveFit {
    fn forecast(&self, history: &[f64], steps: usize) -> Result<Vec<f64>> {
        let p = self.coefficients.len();
        let d = self.difference;
        if history.len() < p + d {
            return Err(RondaError::ModelFit(format!(
                "forecast needs {} observations of history, got {}",
                p + d,
                history.len()
            )));
        }

        let mut levels = vec![history.to_vec()];
        for _ in 0..d {
            let next = difference(&levels[levels.len() - 1], 1);
            levels.push(next);
        }

        let mut work = levels[d].clone();
        let mut forecast = Vec::with_capacity(steps);
        for _ in 0..steps {
            let n = work.len();
            let next = self.intercept
                + self
                    .coefficients
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c * work[n - 1 - i])
                    .sum::<f64>();
            work.push(next);
            forecast.push(next);
        }

        for level in levels[..d].iter().rev() {
            let Some(&start) = level.last() else {
                return Err(RondaError::ModelFit("empty history level".to_string()));
            };
            forecast = forecast
                .iter()
                .scan(start, |acc, delta| {
                    *acc += delta;
                    Some(*acc)
                })
                .collect();
        }

        Ok(forecast)
    }

    fn residual_std(&self) -> Option<f64> {
        Some(self.sigma)
    }
}

/// Differences `values` `order` times; each pass drops the first element.
pub fn difference(values: &[f64], order: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..order {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::series_frame;
    use approx::assert_relative_eq;

    fn ar1_series(n: usize) -> Vec<f64> {
        let mut y = vec![0.0];
        for t in 1..n {
            y.push(0.5 + 0.8 * y[t - 1]);
        }
        y
    }

    #[test]
    fn test_recovers_ar1_coefficients() {
        let fit = Autoregressive
            .estimate(&ar1_series(40), &ModelConfiguration::new())
            .unwrap();
        assert_relative_eq!(fit.intercept(), 0.5, epsilon = 1e-4);
        assert_relative_eq!(fit.coefficients()[0], 0.8, epsilon = 1e-4);
        assert!(fit.sigma() < 1e-4);
    }

    #[test]
    fn test_differenced_trend_forecast() {
        let y: Vec<f64> = (0..30).map(|t| 1.0 + 2.0 * t as f64).collect();
        let config = ModelConfiguration::new().with(DIFFERENCE_KEY, 1_i64);
        let fit = Autoregressive.estimate(&y, &config).unwrap();
        let forecast = fit.forecast(&y, 3).unwrap();
        assert_relative_eq!(forecast[0], 61.0, epsilon = 1e-3);
        assert_relative_eq!(forecast[2], 65.0, epsilon = 1e-3);
    }

    #[test]
    fn test_too_short_series() {
        let config = ModelConfiguration::new().with(ORDER_KEY, 3_i64);
        let result = Autoregressive.estimate(&[1.0, 2.0, 3.0], &config);
        assert!(matches!(result, Err(RondaError::ModelFit(_))));
        assert_eq!(Autoregressive.min_observations(&config), 8);
    }

    #[test]
    fn test_zero_order_rejected() {
        let config = ModelConfiguration::new().with(ORDER_KEY, 0_i64);
        let result = Autoregressive.estimate(&ar1_series(20), &config);
        assert!(matches!(result, Err(RondaError::InvalidConfig(_))));
    }

    #[test]
    fn test_adapter_one_step_tracks_actuals() {
        let frame = series_frame(&ar1_series(50));
        let adapter = StatisticalAdapter::with_defaults(Autoregressive);
        let config = ModelConfiguration::new();
        let model = adapter.fit(&frame.view(0..40).unwrap(), &config).unwrap();
        let view = frame.view(40..50).unwrap();
        let prediction = adapter
            .predict(model.as_ref(), &view, Horizon::OneStep)
            .unwrap();
        let actual = view.continuous_target().unwrap();
        for (p, a) in prediction.values().iter().zip(actual.iter()) {
            assert_relative_eq!(*p, *a, epsilon = 1e-3);
        }
        match prediction {
            Prediction::Point { intervals, .. } => {
                let intervals = intervals.unwrap();
                assert_eq!(intervals.len(), 10);
                assert!(intervals[0].lower <= intervals[0].upper);
            }
            Prediction::Classes { .. } => panic!("expected point forecasts"),
        }
    }

    #[test]
    fn test_adapter_multi_step_intervals_widen() {
        let mut y = ar1_series(40);
        // add some noise so residual variance is positive
        for (t, v) in y.iter_mut().enumerate() {
            *v += if t % 2 == 0 { 0.05 } else { -0.05 };
        }
        let frame = series_frame(&y);
        let adapter = StatisticalAdapter::with_defaults(Autoregressive);
        let model = adapter
            .fit(&frame.view(0..30).unwrap(), &ModelConfiguration::new())
            .unwrap();
        let prediction = adapter
            .predict(model.as_ref(), &frame.view(30..40).unwrap(), Horizon::MultiStep(5))
            .unwrap();
        let Prediction::Point { intervals, .. } = prediction else {
            panic!("expected point forecasts");
        };
        let intervals = intervals.unwrap();
        let width = |i: usize| intervals[i].upper - intervals[i].lower;
        assert!(width(4) > width(0));
        // second block restarts from observed actuals
        assert_relative_eq!(width(5), width(0), epsilon = 1e-12);
    }

    #[test]
    fn test_adapter_respects_max_horizon() {
        let frame = series_frame(&ar1_series(30));
        let adapter = StatisticalAdapter::new(
            Autoregressive,
            StatisticalConfig {
                max_horizon: Some(2),
                ..Default::default()
            },
        );
        let model = adapter
            .fit(&frame.view(0..20).unwrap(), &ModelConfiguration::new())
            .unwrap();
        let result = adapter.predict(model.as_ref(), &frame.view(20..30).unwrap(), Horizon::MultiStep(3));
        assert!(matches!(result, Err(RondaError::UnsupportedHorizon { .. })));
    }

    #[test]
    fn test_adapter_rejects_short_window() {
        let frame = series_frame(&ar1_series(10));
        let adapter = StatisticalAdapter::with_defaults(Autoregressive);
        let result = adapter.fit(&frame.view(0..3).unwrap(), &ModelConfiguration::new());
        assert!(matches!(result, Err(RondaError::ModelFit(_))));
    }
}
