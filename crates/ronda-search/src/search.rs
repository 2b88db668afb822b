//! Hyperparameter search driven through the walk-forward validator.
//!
//! Every trial is a full walk-forward run of one configuration. The running
//! objective is handed to the pruner after each fold, and budget and
//! cancellation are checked between folds, so an in-flight trial stops
//! cleanly and is recorded as [`TrialStatus::Cancelled`]. A trial that runs
//! past its own time limit is recorded as a failed trial with
//! [`FailureKind::Timeout`] and the search moves on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ronda_eval::{FoldControl, FoldResult, Metric, MetricSummary, WalkForwardValidator};
use ronda_traits::{
    Capability, FailureKind, ModelAdapter, ModelConfiguration, Result, RondaError, SEED_KEY,
    SearchSpace, TimeSeriesFrame, check_horizon,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::proposer::{Proposer, TpeProposer};
use crate::pruner::{Pruner, TrajectoryPruner};

/// Terminal state of a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TrialStatus {
    /// Every planned fold ran.
    Complete,
    /// The pruner stopped the trial after fold `at_fold`.
    Pruned {
        /// Index of the last fold that ran
        at_fold: usize,
    },
    /// The configuration was rejected or no fold succeeded.
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable cause
        message: String,
    },
    /// Budget or cancellation interrupted the trial.
    Cancelled,
}

impl TrialStatus {
    /// Whether the trial ran to completion.
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Pruned { .. } => "pruned",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Trial index within the search
    pub trial: usize,
    /// Evaluated configuration
    pub config: ModelConfiguration,
    /// Terminal state
    pub status: TrialStatus,
    /// Aggregate over the folds that ran
    pub summary: MetricSummary,
    /// Mean of the objective metric over the folds that ran
    pub objective: Option<f64>,
    /// Running objective after each fold
    pub trajectory: Vec<f64>,
    /// Fold results
    pub folds: Vec<FoldResult>,
}

impl TrialResult {
    /// Whether the trial can be selected as best.
    pub fn is_selectable(&self) -> bool {
        self.status.is_complete() && self.objective.is_some_and(f64::is_finite)
    }
}

/// Limits on a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBudget {
    /// Maximum number of trials
    pub max_trials: usize,
    /// Wall-clock limit in milliseconds
    pub max_duration_ms: Option<u64>,
    /// Time limit of a single trial in milliseconds
    #[serde(default)]
    pub trial_timeout_ms: Option<u64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_trials: 20,
            max_duration_ms: None,
            trial_timeout_ms: None,
        }
    }
}

impl SearchBudget {
    /// Budget of `max_trials` trials without a time limit.
    pub const fn trials(max_trials: usize) -> Self {
        Self {
            max_trials,
            max_duration_ms: None,
            trial_timeout_ms: None,
        }
    }

    /// Set the wall-clock limit.
    #[must_use]
    pub const fn with_duration(mut self, limit: Duration) -> Self {
        self.max_duration_ms = Some(limit.as_millis() as u64);
        self
    }

    /// Set the time limit of each trial.
    #[must_use]
    pub const fn with_trial_timeout(mut self, limit: Duration) -> Self {
        self.trial_timeout_ms = Some(limit.as_millis() as u64);
        self
    }
}

/// External cancellation flag shared with a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Metric the search optimises
    pub objective: Metric,
    /// Trial and time limits
    pub budget: SearchBudget,
    /// Seed injected into configurations of stochastic adapters
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            objective: Metric::Rmse,
            budget: SearchBudget::default(),
            seed: 42,
        }
    }
}

/// All trials of one (asset, model) search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Objective metric
    pub objective: Metric,
    /// Every recorded trial, in order
    pub trials: Vec<TrialResult>,
}

impl SearchOutcome {
    /// Best complete trial with a finite objective; ties keep the earlier trial.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::SearchExhausted`] when no trial qualifies.
    pub fn best(&self) -> Result<&TrialResult> {
        self.trials
            .iter()
            .filter(|t| t.is_selectable())
            .reduce(|best, t| match (t.objective, best.objective) {
                (Some(a), Some(b)) if self.objective.better(a, b) => t,
                _ => best,
            })
            .ok_or_else(|| RondaError::SearchExhausted {
                asset: self.asset.clone(),
                model: self.model.clone(),
            })
    }

    /// Number of trials with the given status name.
    pub fn count(&self, status: &str) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status.as_str() == status)
            .count()
    }
}

/// Hyperparameter search over one adapter.
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    validator: WalkForwardValidator,
    config: SearchConfig,
    proposer: Arc<dyn Proposer>,
    pruner: Arc<dyn Pruner>,
}

impl HyperparameterSearch {
    /// Create a search with the TPE proposer and trajectory pruner.
    pub fn new(validator: WalkForwardValidator, config: SearchConfig) -> Self {
        Self {
            validator,
            config,
            proposer: Arc::new(TpeProposer::default()),
            pruner: Arc::new(TrajectoryPruner::default()),
        }
    }

    /// Replace the proposer.
    #[must_use]
    pub fn with_proposer(mut self, proposer: impl Proposer + 'static) -> Self {
        self.proposer = Arc::new(proposer);
        self
    }

    /// Replace the pruner.
    #[must_use]
    pub fn with_pruner(mut self, pruner: impl Pruner + 'static) -> Self {
        self.pruner = Arc::new(pruner);
        self
    }

    /// Search configuration.
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Walk-forward validator used by every trial.
    pub const fn validator(&self) -> &WalkForwardValidator {
        &self.validator
    }

    /// Runs trials until the budget, the proposer or cancellation ends the search.
    ///
    /// # Errors
    ///
    /// Returns an error only when the model cannot be evaluated at all on this
    /// frame: an invalid space, a task mismatch or an unsupported horizon.
    /// Per-configuration failures are recorded as failed trials.
    pub fn run(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        space: &SearchSpace,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome> {
        space.validate()?;
        if adapter.task() != frame.task() {
            return Err(RondaError::InvalidConfig(format!(
                "{} is a {} model but {} has a {} target",
                adapter.name(),
                adapter.task(),
                frame.asset(),
                frame.task()
            )));
        }
        check_horizon(adapter.max_horizon(), self.validator.config().horizon)?;

        let objective = self.config.objective;
        let started = Instant::now();
        let deadline = self
            .config
            .budget
            .max_duration_ms
            .map(|ms| started + Duration::from_millis(ms));
        let out_of_time = || deadline.is_some_and(|d| Instant::now() >= d);

        let mut trials: Vec<TrialResult> = Vec::new();
        for index in 0..self.config.budget.max_trials {
            if cancel.is_cancelled() || out_of_time() {
                debug!(asset = frame.asset(), model = adapter.name(), "Search interrupted");
                break;
            }
            let Some(mut config) = self.proposer.propose(space, &trials, index, objective) else {
                debug!(
                    asset = frame.asset(),
                    model = adapter.name(),
                    proposer = self.proposer.name(),
                    "Proposer exhausted"
                );
                break;
            };
            if adapter.supports(Capability::Stochastic) && !config.contains(SEED_KEY) {
                config.insert(SEED_KEY, i64::try_from(self.config.seed).unwrap_or(i64::MAX));
            }

            let trial = self.run_trial(frame, adapter, config, index, &trials, cancel, &out_of_time);
            debug!(
                asset = %trial.asset,
                model = %trial.model,
                trial = index,
                status = trial.status.as_str(),
                objective = ?trial.objective,
                "Trial finished"
            );
            trials.push(trial);
        }

        let outcome = SearchOutcome {
            asset: frame.asset().to_string(),
            model: adapter.name().to_string(),
            objective,
            trials,
        };
        match outcome.best() {
            Ok(best) => info!(
                asset = %outcome.asset,
                model = %outcome.model,
                trials = outcome.trials.len(),
                best_trial = best.trial,
                objective = ?best.objective,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Search complete"
            ),
            Err(_) => warn!(
                asset = %outcome.asset,
                model = %outcome.model,
                trials = outcome.trials.len(),
                "Search exhausted without a complete trial"
            ),
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trial(
        &self,
        frame: &Arc<TimeSeriesFrame>,
        adapter: &Arc<dyn ModelAdapter>,
        config: ModelConfiguration,
        index: usize,
        history: &[TrialResult],
        cancel: &CancelToken,
        out_of_time: &dyn Fn() -> bool,
    ) -> TrialResult {
        let objective = self.config.objective;
        let mut trajectory = Vec::new();
        let (mut sum, mut count) = (0.0, 0usize);
        let mut pruned_at = None;
        let mut interrupted = false;
        let mut timed_out = false;
        let trial_limit = self.config.budget.trial_timeout_ms;
        let trial_deadline = trial_limit.map(|ms| Instant::now() + Duration::from_millis(ms));

        let run = self
            .validator
            .run_with_observer(frame, adapter, &config, |fold| {
                if let Some(value) = fold.metric(objective).filter(|v| v.is_finite()) {
                    sum += value;
                    count += 1;
                }
                trajectory.push(if count > 0 { sum / count as f64 } else { f64::NAN });

                if cancel.is_cancelled() || out_of_time() {
                    interrupted = true;
                    return FoldControl::Stop;
                }
                if trial_deadline.is_some_and(|d| Instant::now() >= d) {
                    timed_out = true;
                    return FoldControl::Stop;
                }
                if self.pruner.should_prune(&trajectory, history, objective) {
                    pruned_at = Some(fold.fold.index);
                    return FoldControl::Stop;
                }
                FoldControl::Continue
            });

        let mut trial = TrialResult {
            asset: frame.asset().to_string(),
            model: adapter.name().to_string(),
            trial: index,
            config,
            status: TrialStatus::Complete,
            summary: MetricSummary::from_folds(std::iter::empty(), 0),
            objective: None,
            trajectory: Vec::new(),
            folds: Vec::new(),
        };

        let run = match run {
            Ok(run) => run,
            Err(err) => {
                trial.status = TrialStatus::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                return trial;
            }
        };

        trial.summary = run.summary();
        trial.objective = trial.summary.mean(objective);
        trial.status = if interrupted && run.stopped_early {
            TrialStatus::Cancelled
        } else if timed_out {
            TrialStatus::Failed {
                kind: FailureKind::Timeout,
                message: format!(
                    "trial exceeded {} ms after {} of {} folds",
                    trial_limit.unwrap_or_default(),
                    run.folds.len(),
                    run.planned_folds
                ),
            }
        } else if let Some(at_fold) = pruned_at.filter(|_| run.stopped_early) {
            TrialStatus::Pruned { at_fold }
        } else if !trial.summary.is_valid() {
            TrialStatus::Failed {
                kind: FailureKind::ModelFit,
                message: format!("all {} folds failed", run.folds.len()),
            }
        } else {
            TrialStatus::Complete
        };
        trial.trajectory = trajectory;
        trial.folds = run.folds;
        trial
    }
}
