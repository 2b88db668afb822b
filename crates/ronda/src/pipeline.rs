//! Pipeline orchestration.
//!
//! A pipeline evaluates every (asset, model) pair of an [`EvaluationContext`]
//! under one configuration, ranks the pairs and collects the artifacts.
//! Forecasting, deep-sequence, Markov and classification pipelines are all
//! instances of the same flow with different models and metrics.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use ronda_eval::{Metric, ValidatorConfig, WalkForwardRun, WalkForwardValidator};
use ronda_rank::{
    ArtifactSet, ArtifactSink, EvaluationRecord, ExclusionReason, Leaderboards, RankingConfig,
    RankingEngine,
};
use ronda_search::{
    CancelToken, GridProposer, HyperparameterSearch, NoPruning, RandomProposer, SearchConfig,
    SearchOutcome, TpeConfig, TpeProposer, TrajectoryPruner,
};
use ronda_traits::{
    AssetId, Capability, FailureKind, ModelAdapter, ModelConfiguration, ModelFamily, Result,
    RondaError, SEED_KEY, Task, TimeSeriesFrame,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::EvaluationContext;

/// Proposer used by pipeline searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposerKind {
    /// Tree-structured Parzen estimator
    #[default]
    Tpe,
    /// Exhaustive grid
    Grid,
    /// Uniform random sampling
    Random,
}

/// Hyperparameter search settings of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Run a search per pair; otherwise each model runs once with its fixed values
    pub enabled: bool,
    /// Proposer
    pub proposer: ProposerKind,
    /// Objective, budget and seed
    pub config: SearchConfig,
    /// Trajectory pruning; `None` disables pruning
    pub pruner: Option<TrajectoryPruner>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            proposer: ProposerKind::Tpe,
            config: SearchConfig::default(),
            pruner: Some(TrajectoryPruner::default()),
        }
    }
}

impl SearchSettings {
    /// Single run per pair, no search.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Pipeline configuration.
///
/// Deserialisable from JSON; omitted fields take their defaults:
///
/// ```
/// use ronda::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(
///     r#"{ "name": "forecasting", "models": ["arima"], "search": { "enabled": false } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.models, vec!["arima"]);
/// assert!(!config.search.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name, used to label artifacts
    pub name: String,
    /// Task every model and frame must share
    pub task: Task,
    /// Models to evaluate; empty means every registered model of `task`
    pub models: Vec<String>,
    /// Assets to evaluate; empty means every registered frame
    pub assets: Vec<AssetId>,
    /// Fold policy, horizon, timeouts and feature selection
    pub validator: ValidatorConfig,
    /// Search settings
    pub search: SearchSettings,
    /// Ranking settings
    pub ranking: RankingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "forecasting".to_string(),
            task: Task::Regression,
            models: Vec::new(),
            assets: Vec::new(),
            validator: ValidatorConfig::default(),
            search: SearchSettings::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Regression pipeline ranked by RMSE.
    pub fn regression(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Classification pipeline ranked by accuracy and searched on accuracy.
    pub fn classification(name: impl Into<String>) -> Self {
        let mut search = SearchSettings::default();
        search.config.objective = Metric::Accuracy;
        Self {
            name: name.into(),
            task: Task::Classification,
            search,
            ranking: RankingConfig::classification(),
            ..Self::default()
        }
    }

    /// Restrict to the given models.
    #[must_use]
    pub fn with_models<S: Into<String>>(mut self, models: impl IntoIterator<Item = S>) -> Self {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to the given assets.
    #[must_use]
    pub fn with_assets<S: Into<String>>(mut self, assets: impl IntoIterator<Item = S>) -> Self {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the validator configuration.
    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Set the search settings.
    #[must_use]
    pub fn with_search(mut self, search: SearchSettings) -> Self {
        self.search = search;
        self
    }

    /// Set the ranking configuration.
    #[must_use]
    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::Json`] for malformed input.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::Io`] when the file cannot be read and
    /// [`RondaError::Json`] for malformed content.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks that the metrics, the fold policy and the horizon fit the task.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        self.validator.policy.validate()?;
        self.validator.horizon.validate()?;
        let metrics = [
            ("ranking primary", Some(self.ranking.primary)),
            ("ranking secondary", self.ranking.secondary),
            ("search objective", Some(self.search.config.objective)),
        ];
        for (what, metric) in metrics {
            if let Some(metric) = metric
                && metric.task() != self.task
            {
                return Err(RondaError::InvalidConfig(format!(
                    "{what} {metric} does not apply to a {} pipeline",
                    self.task
                )));
            }
        }
        Ok(())
    }
}

/// How one pair was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOutcome {
    /// A hyperparameter search ran.
    Searched(SearchOutcome),
    /// A single walk-forward run.
    Validated(WalkForwardRun),
    /// The pair could not be evaluated.
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable cause
        message: String,
    },
}

/// Result of one (asset, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    /// Asset identifier
    pub asset: AssetId,
    /// Model name
    pub model: String,
    /// Model family
    pub family: ModelFamily,
    /// Outcome
    pub outcome: PairOutcome,
}

impl PairResult {
    fn failed(asset: &str, adapter: &dyn ModelAdapter, error: &RondaError) -> Self {
        Self {
            asset: asset.to_string(),
            model: adapter.name().to_string(),
            family: adapter.family(),
            outcome: PairOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    /// Ranking input for this pair.
    pub fn record(&self) -> EvaluationRecord {
        let excluded = |kind: FailureKind, message: String| {
            EvaluationRecord::excluded(
                self.asset.clone(),
                self.model.clone(),
                self.family,
                ExclusionReason::Failed { kind, message },
            )
        };
        match &self.outcome {
            PairOutcome::Searched(search) => match search.best() {
                Ok(best) => EvaluationRecord::evaluated(
                    self.asset.clone(),
                    self.model.clone(),
                    self.family,
                    best.summary.clone(),
                ),
                Err(e) => excluded(e.kind(), e.to_string()),
            },
            PairOutcome::Validated(run) => EvaluationRecord::evaluated(
                self.asset.clone(),
                self.model.clone(),
                self.family,
                run.summary(),
            ),
            PairOutcome::Failed { kind, message } => excluded(*kind, message.clone()),
        }
    }

    /// Selected configuration, when one exists.
    pub fn selected_config(&self) -> Option<&ModelConfiguration> {
        match &self.outcome {
            PairOutcome::Searched(search) => search.best().ok().map(|t| &t.config),
            PairOutcome::Validated(run) => Some(&run.config),
            PairOutcome::Failed { .. } => None,
        }
    }
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Pipeline name
    pub name: String,
    /// One result per pair, ordered by asset then model
    pub results: Vec<PairResult>,
    /// Per-asset and global leaderboards
    pub leaderboards: Leaderboards,
    /// Flat artifact records
    pub artifacts: ArtifactSet,
}

impl PipelineReport {
    /// Result of one pair.
    pub fn result(&self, asset: &str, model: &str) -> Option<&PairResult> {
        self.results
            .iter()
            .find(|r| r.asset == asset && r.model == model)
    }

    /// Writes the artifacts under the pipeline name.
    ///
    /// # Errors
    ///
    /// Propagates sink errors.
    pub fn write_artifacts(&self, sink: &mut dyn ArtifactSink) -> Result<()> {
        sink.write(&self.name, &self.artifacts)
    }
}

struct Pair {
    frame: Arc<TimeSeriesFrame>,
    adapter: Arc<dyn ModelAdapter>,
}

/// Evaluates, ranks and records every (asset, model) pair of a context.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Pipeline configuration.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// See [`run_with_cancel`](Self::run_with_cancel).
    pub fn run(&self, ctx: &EvaluationContext) -> Result<PipelineReport> {
        self.run_with_cancel(ctx, &CancelToken::new())
    }

    /// Runs the pipeline; cancelling `cancel` stops in-flight searches after
    /// their current fold.
    ///
    /// Pairs run in parallel; folds within a pair run in order. Failures of a
    /// pair or an asset are recorded in the report and never stop the batch.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::UnknownModel`] or [`RondaError::InvalidConfig`]
    /// when the configuration names models or assets the context lacks, or a
    /// model whose task differs from the pipeline's.
    pub fn run_with_cancel(
        &self,
        ctx: &EvaluationContext,
        cancel: &CancelToken,
    ) -> Result<PipelineReport> {
        let adapters = self.resolve_models(ctx)?;
        let assets: Vec<AssetId> = if self.config.assets.is_empty() {
            ctx.frames.assets().map(str::to_string).collect()
        } else {
            self.config.assets.clone()
        };
        info!(
            pipeline = %self.config.name,
            assets = assets.len(),
            models = adapters.len(),
            "Starting pipeline"
        );

        let mut results = Vec::new();
        let mut pairs = Vec::new();
        for asset in &assets {
            let frame = ctx.frames.get(asset)?;
            if let Err(e) = self.check_frame(&frame) {
                warn!(pipeline = %self.config.name, asset = %asset, error = %e, "Asset excluded");
                results.extend(adapters.iter().map(|a| PairResult::failed(asset, a.as_ref(), &e)));
                continue;
            }
            pairs.extend(adapters.iter().map(|adapter| Pair {
                frame: Arc::clone(&frame),
                adapter: Arc::clone(adapter),
            }));
        }

        results.par_extend(
            pairs
                .par_iter()
                .map(|pair| self.evaluate(ctx, pair, cancel)),
        );
        results.sort_by(|a, b| (&a.asset, &a.model).cmp(&(&b.asset, &b.model)));

        let records: Vec<EvaluationRecord> = results.iter().map(PairResult::record).collect();
        let leaderboards = RankingEngine::new(self.config.ranking.clone()).rank(&records);

        let mut artifacts = ArtifactSet::new();
        for result in &results {
            match &result.outcome {
                PairOutcome::Searched(search) => artifacts.record_search(search, result.family),
                PairOutcome::Validated(run) => {
                    let summary = run.summary();
                    artifacts.record_config(
                        &run.asset,
                        &run.model,
                        result.family,
                        None,
                        &run.config,
                        summary.mean(self.config.ranking.primary),
                    );
                    artifacts.record_run(run, result.family);
                }
                PairOutcome::Failed { .. } => {}
            }
        }
        artifacts.record_leaderboards(&leaderboards);
        artifacts.canonicalize();

        info!(
            pipeline = %self.config.name,
            pairs = results.len(),
            ranked = leaderboards
                .assets
                .iter()
                .map(|b| b.entries.iter().filter(|e| e.rank.is_some()).count())
                .sum::<usize>(),
            "Pipeline complete"
        );
        Ok(PipelineReport {
            name: self.config.name.clone(),
            results,
            leaderboards,
            artifacts,
        })
    }

    fn resolve_models(&self, ctx: &EvaluationContext) -> Result<Vec<Arc<dyn ModelAdapter>>> {
        if self.config.models.is_empty() {
            return Ok(ctx
                .adapters
                .names()
                .filter_map(|name| ctx.adapters.get(name).ok())
                .filter(|a| a.task() == self.config.task)
                .collect());
        }
        self.config
            .models
            .iter()
            .map(|name| {
                let adapter = ctx.adapters.get(name)?;
                if adapter.task() != self.config.task {
                    return Err(RondaError::InvalidConfig(format!(
                        "{name} is a {} model in a {} pipeline",
                        adapter.task(),
                        self.config.task
                    )));
                }
                Ok(adapter)
            })
            .collect()
    }

    fn check_frame(&self, frame: &TimeSeriesFrame) -> Result<()> {
        frame.validate()?;
        if frame.task() != self.config.task {
            return Err(RondaError::DataContractViolation(format!(
                "{} has a {} target in a {} pipeline",
                frame.asset(),
                frame.task(),
                self.config.task
            )));
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &EvaluationContext, pair: &Pair, cancel: &CancelToken) -> PairResult {
        let asset = pair.frame.asset();
        let adapter = &pair.adapter;
        let validator = WalkForwardValidator::new(self.config.validator.clone());

        let outcome = if self.config.search.enabled {
            let space = ctx
                .adapters
                .space(adapter.name())
                .map_or_else(|_| adapter.default_space(), Clone::clone);
            self.searcher(validator)
                .run(&pair.frame, adapter, &space, cancel)
                .map(PairOutcome::Searched)
        } else {
            let mut config = ctx
                .adapters
                .space(adapter.name())
                .map(|s| s.fixed_values().clone())
                .unwrap_or_default();
            if adapter.supports(Capability::Stochastic) && !config.contains(SEED_KEY) {
                config.insert(
                    SEED_KEY,
                    i64::try_from(self.config.search.config.seed).unwrap_or(i64::MAX),
                );
            }
            validator
                .run(&pair.frame, adapter, &config)
                .map(PairOutcome::Validated)
        };

        match outcome {
            Ok(outcome) => {
                debug!(asset, model = adapter.name(), "Pair evaluated");
                PairResult {
                    asset: asset.to_string(),
                    model: adapter.name().to_string(),
                    family: adapter.family(),
                    outcome,
                }
            }
            Err(e) => {
                warn!(asset, model = adapter.name(), error = %e, "Pair failed");
                PairResult::failed(asset, adapter.as_ref(), &e)
            }
        }
    }

    fn searcher(&self, validator: WalkForwardValidator) -> HyperparameterSearch {
        let settings = &self.config.search;
        let search = HyperparameterSearch::new(validator, settings.config.clone());
        let search = match settings.proposer {
            ProposerKind::Tpe => search.with_proposer(TpeProposer::new(TpeConfig {
                seed: settings.config.seed,
                ..TpeConfig::default()
            })),
            ProposerKind::Grid => search.with_proposer(GridProposer::default()),
            ProposerKind::Random => search.with_proposer(RandomProposer {
                seed: settings.config.seed,
            }),
        };
        match settings.pruner {
            Some(pruner) => search.with_pruner(pruner),
            None => search.with_pruner(NoPruning),
        }
    }
}
