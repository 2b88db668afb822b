//! Walk-forward execution of one model on one asset.
//!
//! Folds run strictly in temporal order. Fold-local failures (fit failures
//! and timeouts) are recorded as failed folds; anything else stops the run
//! for this model and is returned to the caller.

use std::ops::Range;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use ndarray::Array2;
use ronda_traits::{
    Date, FailureKind, FrameView, Horizon, Interval, ModelAdapter, ModelConfiguration,
    Prediction, Result, RondaError, Target, TimeSeriesFrame, check_horizon,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::MetricSummary;
use crate::metrics::{
    FoldMetrics, Metric, MetricsConfig, classification_metrics, regression_metrics,
};
use crate::selection::FeatureSelection;
use crate::walkforward::{Fold, FoldPolicy};

/// What happened in one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FoldOutcome {
    /// The model was fitted and predicted every validation row.
    Success {
        /// Validation timestamps
        timestamps: Vec<Date>,
        /// Actual target values (labels as `f64` for classification)
        actuals: Vec<f64>,
        /// Point forecasts or hard labels
        predictions: Vec<f64>,
        /// Prediction intervals, when the family produces them
        intervals: Option<Vec<Interval>>,
        /// Class probabilities per row, for classification
        probabilities: Option<Vec<Vec<f64>>>,
        /// `actual - predicted`; empty for classification
        residuals: Vec<f64>,
        /// Fold metrics
        metrics: FoldMetrics,
        /// Features the model was trained on, when selection was applied
        selected_features: Option<Vec<String>>,
    },
    /// The fold failed and was skipped.
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable cause
        message: String,
    },
}

/// Result of one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Fold boundaries
    pub fold: Fold,
    /// First training timestamp
    pub train_start: Date,
    /// Last training timestamp
    pub train_end: Date,
    /// First validation timestamp
    pub validation_start: Date,
    /// Last validation timestamp
    pub validation_end: Date,
    /// Outcome
    pub outcome: FoldOutcome,
}

impl FoldResult {
    /// Whether the fold succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, FoldOutcome::Success { .. })
    }

    /// Fold metrics, for successful folds.
    pub const fn metrics(&self) -> Option<&FoldMetrics> {
        match &self.outcome {
            FoldOutcome::Success { metrics, .. } => Some(metrics),
            FoldOutcome::Failed { .. } => None,
        }
    }

    /// Value of one metric, for successful folds that define it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics().and_then(|m| m.get(metric))
    }
}

/// Decision returned by a fold observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldControl {
    /// Run the next fold.
    Continue,
    /// Stop after this fold.
    Stop,
}

/// Walk-forward validator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Fold policy
    pub policy: FoldPolicy,
    /// Prediction horizon
    pub horizon: Horizon,
    /// Per-fold time limit for fit plus predict, in milliseconds
    pub fold_timeout_ms: Option<u64>,
    /// Metric settings
    pub metrics: MetricsConfig,
    /// In-fold feature selection
    pub selection: FeatureSelection,
}

impl ValidatorConfig {
    /// Config with the given policy and defaults elsewhere.
    #[must_use]
    pub fn with_policy(policy: FoldPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Set the horizon.
    #[must_use]
    pub const fn horizon(mut self, horizon: Horizon) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set the per-fold timeout.
    #[must_use]
    pub const fn fold_timeout(mut self, timeout: Duration) -> Self {
        self.fold_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the feature selection strategy.
    #[must_use]
    pub fn selection(mut self, selection: FeatureSelection) -> Self {
        self.selection = selection;
        self
    }
}

/// All fold results of one (asset, model, configuration) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardRun {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Configuration the model was run with
    pub config: ModelConfiguration,
    /// Results of the folds that ran, in order
    pub folds: Vec<FoldResult>,
    /// Number of folds the policy generated
    pub planned_folds: usize,
    /// Whether an observer stopped the run before the last fold
    pub stopped_early: bool,
}

impl WalkForwardRun {
    /// Aggregates the fold metrics.
    pub fn summary(&self) -> MetricSummary {
        MetricSummary::from_folds(
            self.folds.iter().filter_map(FoldResult::metrics),
            self.failed_folds(),
        )
    }

    /// Number of failed folds.
    pub fn failed_folds(&self) -> usize {
        self.folds.iter().filter(|f| !f.is_success()).count()
    }
}

/// Drives one adapter through the fold policy.
#[derive(Debug, Clone, Default)]
pub struct WalkForwardValidator {
    config: ValidatorConfig,
}

impl WalkForwardValidator {
    /// Create a new validator.
    pub const fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validator configuration.
    pub const fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Folds that a run with `adapter` and `config` would evaluate.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for invalid policies.
    pub fn plan(
        &self,
        frame: &TimeSeriesFrame,
        adapter: &dyn ModelAdapter,
        config: &ModelConfiguration,
    ) -> Result<Vec<Fold>> {
        self.config
            .policy
            .folds(frame.len(), adapter.min_train_len(config), config)
    }

    /// Runs every fold.
    ///
    /// # Errors
    ///
    /// See [`run_with_observer`](Self::run_with_observer).
    pub fn run(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        config: &ModelConfiguration,
    ) -> Result<WalkForwardRun> {
        self.run_with_observer(frame, adapter, config, |_| FoldControl::Continue)
    }

    /// Runs folds in order, handing each result to `observer`, which may stop
    /// the run.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnsupportedHorizon`] when the adapter cannot
    /// serve the configured horizon, [`RondaError::InvalidConfig`] for invalid
    /// policies, selections or a task mismatch between frame and adapter, and
    /// any other non fold-local error raised by the adapter.
    pub fn run_with_observer<F>(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        config: &ModelConfiguration,
        mut observer: F,
    ) -> Result<WalkForwardRun>
    where
        F: FnMut(&FoldResult) -> FoldControl,
    {
        if adapter.task() != frame.task() {
            return Err(RondaError::InvalidConfig(format!(
                "{} is a {} model but {} has a {} target",
                adapter.name(),
                adapter.task(),
                frame.asset(),
                frame.task()
            )));
        }
        check_horizon(adapter.max_horizon(), self.config.horizon)?;

        let plan = self.plan(frame, adapter.as_ref(), config)?;
        let selection = self.config.selection.resolve(config)?;

        let mut run = WalkForwardRun {
            asset: frame.asset().to_string(),
            model: adapter.name().to_string(),
            config: config.clone(),
            folds: Vec::with_capacity(plan.len()),
            planned_folds: plan.len(),
            stopped_early: false,
        };
        if plan.is_empty() {
            warn!(
                asset = frame.asset(),
                model = adapter.name(),
                rows = frame.len(),
                "Fold policy produced no folds"
            );
            return Ok(run);
        }

        for fold in plan {
            let result = self.run_fold(frame, adapter, config, &selection, fold)?;
            match &result.outcome {
                FoldOutcome::Success { metrics, .. } => debug!(
                    asset = %result.asset,
                    model = %result.model,
                    fold = result.fold.index,
                    metrics = ?metrics.values,
                    "Fold complete"
                ),
                FoldOutcome::Failed { kind, message } => warn!(
                    asset = %result.asset,
                    model = %result.model,
                    fold = result.fold.index,
                    %kind,
                    %message,
                    "Fold failed"
                ),
            }
            let control = observer(&result);
            run.folds.push(result);
            if control == FoldControl::Stop {
                run.stopped_early = run.folds.len() < run.planned_folds;
                break;
            }
        }

        Ok(run)
    }

    fn run_fold(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        config: &ModelConfiguration,
        selection: &FeatureSelection,
        fold: Fold,
    ) -> Result<FoldResult> {
        let timestamps = frame.timestamps();
        let mut result = FoldResult {
            asset: frame.asset().to_string(),
            model: adapter.name().to_string(),
            train_start: timestamps[fold.train.start],
            train_end: timestamps[fold.train.end - 1],
            validation_start: timestamps[fold.validation.start],
            validation_end: timestamps[fold.validation.end - 1],
            fold,
            outcome: FoldOutcome::Failed {
                kind: FailureKind::Other,
                message: String::new(),
            },
        };

        let columns = selection.select(&frame.view(result.fold.train.clone())?)?;
        let prediction = match self.fit_predict(frame, adapter, config, &result.fold, columns.clone())
        {
            Ok(prediction) => prediction,
            Err(err) if err.is_fold_local() => {
                result.outcome = FoldOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                return Ok(result);
            }
            Err(err) => return Err(err),
        };

        let selected_features = columns.map(|cols| {
            cols.iter()
                .map(|&c| frame.feature_names()[c].clone())
                .collect()
        });
        result.outcome = self.score(frame, &result.fold, prediction, selected_features)?;
        Ok(result)
    }

    fn fit_predict(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        config: &ModelConfiguration,
        fold: &Fold,
        columns: Option<Vec<usize>>,
    ) -> Result<Prediction> {
        let horizon = self.config.horizon;
        let Some(ms) = self.config.fold_timeout_ms else {
            return fit_predict(
                frame,
                adapter.as_ref(),
                config,
                fold.train.clone(),
                fold.validation.clone(),
                columns,
                horizon,
            );
        };

        let limit = Duration::from_millis(ms);
        let (tx, rx) = mpsc::channel();
        let frame = Arc::clone(frame);
        let adapter = Arc::clone(adapter);
        let config = config.clone();
        let (train, validation) = (fold.train.clone(), fold.validation.clone());
        // The worker is detached; on timeout it finishes in the background
        // and its send fails silently.
        thread::spawn(move || {
            let result = fit_predict(
                &frame,
                adapter.as_ref(),
                &config,
                train,
                validation,
                columns,
                horizon,
            );
            let _ = tx.send(result);
        });

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(RondaError::Timeout(limit)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RondaError::ModelFit(
                "fold worker exited without a result".to_string(),
            )),
        }
    }

    fn score(
        &self,
        frame: &TimeSeriesFrame,
        fold: &Fold,
        prediction: Prediction,
        selected_features: Option<Vec<String>>,
    ) -> Result<FoldOutcome> {
        let validation = frame.view(fold.validation.clone())?;
        let timestamps = validation.timestamps().to_vec();
        let actuals = validation.target_values();

        let outcome = match (frame.target(), prediction) {
            (Target::Continuous(values), Prediction::Point { values: predicted, intervals }) => {
                let predictions = predicted.to_vec();
                if predictions.iter().any(|p| !p.is_finite()) {
                    return Ok(FoldOutcome::Failed {
                        kind: FailureKind::ModelFit,
                        message: "non-finite point forecast".to_string(),
                    });
                }
                let previous = fold.train.end.checked_sub(1).map(|i| values[i]);
                let metrics =
                    regression_metrics(&actuals, &predictions, previous, &self.config.metrics);
                let residuals = actuals.iter().zip(&predictions).map(|(a, p)| a - p).collect();
                FoldOutcome::Success {
                    timestamps,
                    actuals,
                    predictions,
                    intervals,
                    probabilities: None,
                    residuals,
                    metrics,
                    selected_features,
                }
            }
            (
                Target::Categorical { n_classes, .. },
                Prediction::Classes {
                    probabilities,
                    labels,
                },
            ) => {
                let actual_labels = validation.labels()?.to_vec();
                let predicted_labels = labels.to_vec();
                let metrics = classification_metrics(
                    &actual_labels,
                    &predicted_labels,
                    Some(&probabilities),
                    *n_classes,
                );
                FoldOutcome::Success {
                    timestamps,
                    actuals,
                    predictions: predicted_labels.iter().map(|&l| l as f64).collect(),
                    intervals: None,
                    probabilities: Some(rows(&probabilities)),
                    residuals: Vec::new(),
                    metrics,
                    selected_features,
                }
            }
            (target, _) => {
                return Err(RondaError::InvalidConfig(format!(
                    "prediction kind does not match the {} target of {}",
                    target.task(),
                    frame.asset()
                )));
            }
        };
        Ok(outcome)
    }
}

fn fit_predict(
    frame: &TimeSeriesFrame,
    adapter: &dyn ModelAdapter,
    config: &ModelConfiguration,
    train: Range<usize>,
    validation: Range<usize>,
    columns: Option<Vec<usize>>,
    horizon: Horizon,
) -> Result<Prediction> {
    let (train_view, validation_view) = views(frame, train, validation, columns)?;
    let model = adapter.fit(&train_view, config)?;
    adapter.predict(model.as_ref(), &validation_view, horizon)
}

fn views(
    frame: &TimeSeriesFrame,
    train: Range<usize>,
    validation: Range<usize>,
    columns: Option<Vec<usize>>,
) -> Result<(FrameView<'_>, FrameView<'_>)> {
    let train = frame.view(train)?;
    let validation = frame.view(validation)?;
    match columns {
        None => Ok((train, validation)),
        Some(cols) => Ok((train.with_columns(cols.clone())?, validation.with_columns(cols)?)),
    }
}

fn rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walkforward::WindowKind;
    use approx::assert_relative_eq;
    use chrono::{Duration as Days, NaiveDate};
    use ndarray::{Array1, Array2};
    use ronda_traits::{Capability, FittedModel, ModelFamily, Task};

    fn frame(n: usize) -> Arc<TimeSeriesFrame> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let target = Array1::from_shape_fn(n, |i| 10.0 + i as f64);
        let features = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        Arc::new(
            TimeSeriesFrame::new(
                "ASSET",
                (0..n).map(|i| start + Days::days(i as i64)).collect(),
                vec!["trend".to_string()],
                features,
                Target::Continuous(target),
            )
            .unwrap(),
        )
    }

    /// Predicts the last observed actual before each row.
    #[derive(Debug)]
    struct Naive {
        fail_below: usize,
        delay: Option<Duration>,
    }

    #[derive(Debug)]
    struct FittedNaive {
        last: f64,
    }

    impl FittedModel for FittedNaive {
        fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
            let actual = view.continuous_target()?;
            let mut out = Vec::with_capacity(view.len());
            for block in horizon.blocks(view.len()) {
                let anchor = if block.start == 0 {
                    self.last
                } else {
                    actual[block.start - 1]
                };
                out.extend(block.map(|_| anchor));
            }
            Ok(Prediction::point(Array1::from_vec(out)))
        }
    }

    impl ModelAdapter for Naive {
        fn name(&self) -> &str {
            "naive"
        }
        fn family(&self) -> ModelFamily {
            ModelFamily::Statistical
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
        fn max_horizon(&self) -> Option<usize> {
            Some(5)
        }
        fn fit(
            &self,
            train: &FrameView<'_>,
            _config: &ModelConfiguration,
        ) -> Result<Box<dyn FittedModel>> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if train.len() < self.fail_below {
                return Err(RondaError::ModelFit("window too short".to_string()));
            }
            let y = train.continuous_target()?;
            Ok(Box::new(FittedNaive { last: y[y.len() - 1] }))
        }
    }

    fn adapter(fail_below: usize) -> Arc<dyn ModelAdapter> {
        Arc::new(Naive {
            fail_below,
            delay: None,
        })
    }

    fn validator() -> WalkForwardValidator {
        WalkForwardValidator::new(ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5)))
    }

    #[test]
    fn test_eight_folds() {
        let run = validator()
            .run(&frame(100), &adapter(0), &ModelConfiguration::new())
            .unwrap();
        assert_eq!(run.planned_folds, 8);
        assert_eq!(run.folds.len(), 8);
        assert!(run.folds.iter().all(FoldResult::is_success));

        let first = &run.folds[0];
        assert_eq!(first.train_end, NaiveDate::from_ymd_opt(2022, 3, 3).unwrap());
        assert_eq!(first.validation_start, NaiveDate::from_ymd_opt(2022, 3, 4).unwrap());
        // one-step naive on a unit trend is off by exactly one
        assert_relative_eq!(first.metric(Metric::Mae).unwrap(), 1.0);
        // flat forecasts never match a rising series
        assert_relative_eq!(first.metric(Metric::DirectionalAccuracy).unwrap(), 0.0);
        if let FoldOutcome::Success { residuals, .. } = &first.outcome {
            assert!(residuals.iter().all(|r| (*r - 1.0).abs() < 1e-12));
        }

        let summary = run.summary();
        assert_eq!(summary.valid_folds, 8);
        assert_eq!(
            summary.mape_included_folds + summary.mape_excluded_folds,
            summary.valid_folds
        );
    }

    #[test]
    fn test_multi_step_horizon() {
        let validator = WalkForwardValidator::new(
            ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5))
                .horizon(Horizon::MultiStep(5)),
        );
        let run = validator
            .run(&frame(70), &adapter(0), &ModelConfiguration::new())
            .unwrap();
        // the whole block is forecast from the last training value
        assert_relative_eq!(run.folds[0].metric(Metric::Mae).unwrap(), 3.0);
    }

    #[test]
    fn test_unsupported_horizon_aborts() {
        let validator = WalkForwardValidator::new(
            ValidatorConfig::default().horizon(Horizon::MultiStep(10)),
        );
        let err = validator
            .run(&frame(100), &adapter(0), &ModelConfiguration::new())
            .unwrap_err();
        assert!(matches!(err, RondaError::UnsupportedHorizon { requested: 10, max: 5 }));
    }

    #[test]
    fn test_fit_failures_are_recorded() {
        let validator = WalkForwardValidator::new(ValidatorConfig::with_policy(
            FoldPolicy::expanding(60, 5, 5).with_window(WindowKind::Expanding),
        ));
        let run = validator
            .run(&frame(100), &adapter(70), &ModelConfiguration::new())
            .unwrap();
        assert_eq!(run.failed_folds(), 2);
        assert!(matches!(
            run.folds[0].outcome,
            FoldOutcome::Failed {
                kind: FailureKind::ModelFit,
                ..
            }
        ));
        assert!(run.folds[2].is_success());

        let all_failed = validator
            .run(&frame(100), &adapter(1_000), &ModelConfiguration::new())
            .unwrap();
        assert_eq!(all_failed.failed_folds(), 8);
        assert!(!all_failed.summary().is_valid());
    }

    #[test]
    fn test_observer_stops() {
        let mut seen = 0;
        let run = validator()
            .run_with_observer(&frame(100), &adapter(0), &ModelConfiguration::new(), |_| {
                seen += 1;
                if seen == 3 {
                    FoldControl::Stop
                } else {
                    FoldControl::Continue
                }
            })
            .unwrap();
        assert_eq!(run.folds.len(), 3);
        assert!(run.stopped_early);
    }

    #[test]
    fn test_timeout_recorded() {
        let slow: Arc<dyn ModelAdapter> = Arc::new(Naive {
            fail_below: 0,
            delay: Some(Duration::from_millis(300)),
        });
        let validator = WalkForwardValidator::new(
            ValidatorConfig::with_policy(FoldPolicy::expanding(90, 5, 5))
                .fold_timeout(Duration::from_millis(20)),
        );
        let run = validator
            .run(&frame(100), &slow, &ModelConfiguration::new())
            .unwrap();
        assert_eq!(run.folds.len(), 2);
        assert!(run.folds.iter().all(|f| matches!(
            f.outcome,
            FoldOutcome::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        )));
    }

    #[test]
    fn test_deterministic() {
        let frame = frame(100);
        let a = validator()
            .run(&frame, &adapter(0), &ModelConfiguration::new())
            .unwrap();
        let b = validator()
            .run(&frame, &adapter(0), &ModelConfiguration::new())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_task_mismatch() {
        let labels = Target::Categorical {
            labels: Array1::from_shape_fn(20, |i| i % 2),
            n_classes: 2,
        };
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let frame = Arc::new(
            TimeSeriesFrame::new(
                "CLS",
                (0..20).map(|i| start + Days::days(i)).collect(),
                vec![],
                Array2::zeros((20, 0)),
                labels,
            )
            .unwrap(),
        );
        assert!(matches!(
            validator().run(&frame, &adapter(0), &ModelConfiguration::new()),
            Err(RondaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fold_result_serializes() {
        let run = validator()
            .run(&frame(70), &adapter(0), &ModelConfiguration::new())
            .unwrap();
        let json = serde_json::to_string(&run.folds[0]).unwrap();
        assert!(json.contains("\"status\":\"success\""));
    }
}
