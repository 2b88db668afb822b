//! Shared fixtures for pipeline tests.

use chrono::{Duration, NaiveDate};
use ndarray::{Array1, Array2};
use ronda::traits::{
    Capability, FittedModel, FrameView, Horizon, ModelAdapter, ModelConfiguration, ModelFamily,
    Prediction, Result, RondaError, SearchSpace, Target, Task, TimeSeriesFrame,
};

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

fn price(i: usize) -> f64 {
    100.0 + 0.5 * i as f64 + 2.0 * (i as f64 * 0.7).sin()
}

/// Oscillating uptrend with one `trend` feature.
pub fn trend_frame(asset: &str, n: usize) -> TimeSeriesFrame {
    TimeSeriesFrame::new(
        asset,
        dates(n),
        vec!["trend".to_string()],
        Array2::from_shape_fn((n, 1), |(i, _)| i as f64),
        Target::Continuous(Array1::from_shape_fn(n, price)),
    )
    .unwrap()
}

/// Up/down labels of the same series.
pub fn direction_frame(asset: &str, n: usize) -> TimeSeriesFrame {
    let prices: Vec<f64> = (0..n).map(price).collect();
    TimeSeriesFrame::direction_labels(
        asset,
        dates(n),
        vec!["trend".to_string()],
        Array2::from_shape_fn((n, 1), |(i, _)| i as f64),
        &prices,
    )
    .unwrap()
}

/// Last observed value plus a damped average drift.
#[derive(Debug)]
pub struct Drift {
    pub name: &'static str,
    pub family: ModelFamily,
}

#[derive(Debug)]
struct FittedDrift {
    last: f64,
    step: f64,
}

impl FittedModel for FittedDrift {
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
        let actual = view.continuous_target()?;
        let mut out = Vec::with_capacity(view.len());
        for block in horizon.blocks(view.len()) {
            let anchor = if block.start == 0 {
                self.last
            } else {
                actual[block.start - 1]
            };
            out.extend((1..=block.len()).map(|k| anchor + self.step * k as f64));
        }
        Ok(Prediction::point(Array1::from_vec(out)))
    }
}

impl ModelAdapter for Drift {
    fn name(&self) -> &str {
        self.name
    }
    fn family(&self) -> ModelFamily {
        self.family
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
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new().float("damping", 0.0, 1.0, false)
    }
    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        let damping = config.f64_or("damping", 1.0)?;
        let y = train.continuous_target()?;
        let n = y.len();
        let drift = (y[n - 1] - y[0]) / (n - 1) as f64;
        Ok(Box::new(FittedDrift {
            last: y[n - 1],
            step: damping * drift,
        }))
    }
}

/// Never converges.
#[derive(Debug)]
pub struct Broken;

impl ModelAdapter for Broken {
    fn name(&self) -> &str {
        "broken"
    }
    fn family(&self) -> ModelFamily {
        ModelFamily::TreeEnsemble
    }
    fn task(&self) -> Task {
        Task::Regression
    }
    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::PointForecast)
    }
    fn min_train_len(&self, _config: &ModelConfiguration) -> usize {
        1
    }
    fn fit(
        &self,
        _train: &FrameView<'_>,
        _config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        Err(RondaError::ModelFit("solver did not converge".to_string()))
    }
}
