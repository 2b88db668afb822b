//! Flat artifact records and sinks.
//!
//! Every artifact is a plain record set keyed by asset and model, so it can be
//! turned into a polars [`DataFrame`] or written out as JSON without knowing
//! anything about the run that produced it.

use std::collections::BTreeMap;
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use polars::prelude::*;
use ronda_eval::{FoldOutcome, FoldResult, MetricSummary, WalkForwardRun};
use ronda_search::{SearchOutcome, TrialStatus};
use ronda_traits::{Date, ModelConfiguration, ModelFamily, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::leaderboard::{EntryStatus, Leaderboards};

/// Fold label of cross-fold rows.
pub const AGGREGATE: &str = "aggregate";

/// One metric value of one fold, or of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// Fold index, or [`AGGREGATE`]
    pub fold: String,
    /// Metric name
    pub metric: String,
    /// `value` for fold rows, `mean` or `std` for aggregate rows
    pub statistic: String,
    /// Metric value
    pub value: f64,
    /// First validation date covered
    pub start: Option<Date>,
    /// Last validation date covered
    pub end: Option<Date>,
}

/// One predicted validation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// Fold index
    pub fold: usize,
    /// Row timestamp
    pub date: Date,
    /// Actual value
    pub actual: f64,
    /// Forecast or predicted label
    pub predicted: f64,
    /// `actual - predicted` for point forecasts
    pub residual: Option<f64>,
    /// Lower interval bound
    pub lower: Option<f64>,
    /// Upper interval bound
    pub upper: Option<f64>,
}

/// Selected configuration of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// Winning trial, when the configuration came from a search
    pub trial: Option<usize>,
    /// Configuration key, e.g. `order=2,seed=7`
    pub params: String,
    /// Full configuration
    pub config: ModelConfiguration,
    /// Objective of the winning trial
    pub objective: Option<f64>,
}

/// One line of the trial log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// Trial index
    pub trial: usize,
    /// Terminal status
    pub status: String,
    /// Objective over the folds that ran
    pub objective: Option<f64>,
    /// Folds that ran
    pub folds_run: usize,
    /// Fold after which the trial was pruned
    pub pruned_at: Option<usize>,
    /// Configuration key
    pub params: String,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    /// Asset identifier
    pub asset: String,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// 1-based rank
    pub rank: Option<usize>,
    /// Entry status
    pub status: String,
    /// Primary metric name
    pub metric: String,
    /// Primary metric mean
    pub value: Option<f64>,
    /// Primary metric standard deviation
    pub dispersion: Option<f64>,
    /// Exclusion reason
    pub reason: Option<String>,
}

/// One global leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    /// Position
    pub position: usize,
    /// Model name
    pub model: String,
    /// Model family
    pub family: String,
    /// Mean rank over ranked assets
    pub mean_rank: Option<f64>,
    /// Assets ranked
    pub assets_ranked: usize,
    /// Assets excluded
    pub assets_excluded: usize,
}

/// Every artifact of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSet {
    /// Selected configurations
    pub best_configs: Vec<ConfigRecord>,
    /// Prediction and residual series
    pub series: Vec<SeriesRecord>,
    /// Fold and aggregate metrics
    pub metrics: Vec<MetricRecord>,
    /// Trial log
    pub trials: Vec<TrialRecord>,
    /// Per-asset leaderboards
    pub leaderboard: Vec<LeaderboardRecord>,
    /// Global leaderboard
    pub global: Vec<GlobalRecord>,
}

impl ArtifactSet {
    /// Create an empty artifact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the folds, series and summary of a walk-forward run.
    pub fn record_run(&mut self, run: &WalkForwardRun, family: ModelFamily) {
        self.record_folds(&run.asset, &run.model, family, &run.folds, &run.summary());
    }

    /// Records the trial log of a search and, when one exists, the best
    /// trial's configuration, folds and summary.
    pub fn record_search(&mut self, outcome: &SearchOutcome, family: ModelFamily) {
        for trial in &outcome.trials {
            self.trials.push(TrialRecord {
                asset: trial.asset.clone(),
                model: trial.model.clone(),
                family: family.as_str().to_string(),
                trial: trial.trial,
                status: trial.status.as_str().to_string(),
                objective: trial.objective,
                folds_run: trial.folds.len(),
                pruned_at: match trial.status {
                    TrialStatus::Pruned { at_fold } => Some(at_fold),
                    _ => None,
                },
                params: trial.config.key(),
            });
        }
        if let Ok(best) = outcome.best() {
            self.record_config(
                &best.asset,
                &best.model,
                family,
                Some(best.trial),
                &best.config,
                best.objective,
            );
            self.record_folds(&best.asset, &best.model, family, &best.folds, &best.summary);
        }
    }

    /// Records a selected configuration.
    pub fn record_config(
        &mut self,
        asset: &str,
        model: &str,
        family: ModelFamily,
        trial: Option<usize>,
        config: &ModelConfiguration,
        objective: Option<f64>,
    ) {
        self.best_configs.push(ConfigRecord {
            asset: asset.to_string(),
            model: model.to_string(),
            family: family.as_str().to_string(),
            trial,
            params: config.key(),
            config: config.clone(),
            objective,
        });
    }

    /// Records every per-asset and global leaderboard row.
    pub fn record_leaderboards(&mut self, boards: &Leaderboards) {
        for board in &boards.assets {
            for entry in &board.entries {
                self.leaderboard.push(LeaderboardRecord {
                    asset: entry.asset.clone(),
                    model: entry.model.clone(),
                    family: entry.family.as_str().to_string(),
                    rank: entry.rank,
                    status: entry.status.as_str().to_string(),
                    metric: board.primary.as_str().to_string(),
                    value: entry.metrics.get(&board.primary).copied(),
                    dispersion: entry.dispersion,
                    reason: match &entry.status {
                        EntryStatus::Excluded { reason } => Some(reason.to_string()),
                        _ => None,
                    },
                });
            }
        }
        for entry in &boards.global.entries {
            self.global.push(GlobalRecord {
                position: entry.position,
                model: entry.model.clone(),
                family: entry.family.as_str().to_string(),
                mean_rank: entry.mean_rank,
                assets_ranked: entry.assets_ranked,
                assets_excluded: entry.assets_excluded,
            });
        }
    }

    fn record_folds(
        &mut self,
        asset: &str,
        model: &str,
        family: ModelFamily,
        folds: &[FoldResult],
        summary: &MetricSummary,
    ) {
        let family = family.as_str();
        for fold in folds {
            let FoldOutcome::Success {
                timestamps,
                actuals,
                predictions,
                intervals,
                residuals,
                metrics,
                ..
            } = &fold.outcome
            else {
                continue;
            };
            let rows = timestamps.iter().zip(actuals).zip(predictions).enumerate();
            for (i, ((date, actual), predicted)) in rows {
                let interval = intervals.as_ref().and_then(|iv| iv.get(i));
                self.series.push(SeriesRecord {
                    asset: asset.to_string(),
                    model: model.to_string(),
                    family: family.to_string(),
                    fold: fold.fold.index,
                    date: *date,
                    actual: *actual,
                    predicted: *predicted,
                    residual: residuals.get(i).copied(),
                    lower: interval.map(|iv| iv.lower),
                    upper: interval.map(|iv| iv.upper),
                });
            }
            for (metric, value) in &metrics.values {
                self.metrics.push(MetricRecord {
                    asset: asset.to_string(),
                    model: model.to_string(),
                    family: family.to_string(),
                    fold: fold.fold.index.to_string(),
                    metric: metric.as_str().to_string(),
                    statistic: "value".to_string(),
                    value: *value,
                    start: Some(fold.validation_start),
                    end: Some(fold.validation_end),
                });
            }
        }

        let start = folds.first().map(|f| f.validation_start);
        let end = folds.last().map(|f| f.validation_end);
        for (metric, stat) in &summary.metrics {
            for (statistic, value) in [("mean", stat.mean), ("std", stat.std)] {
                self.metrics.push(MetricRecord {
                    asset: asset.to_string(),
                    model: model.to_string(),
                    family: family.to_string(),
                    fold: AGGREGATE.to_string(),
                    metric: metric.as_str().to_string(),
                    statistic: statistic.to_string(),
                    value,
                    start,
                    end,
                });
            }
        }
    }

    /// Sorts every record set by asset and model, keeping insertion order
    /// within a pair.
    pub fn canonicalize(&mut self) {
        fn by_pair<T>(records: &mut [T], key: impl Fn(&T) -> (&str, &str)) {
            records.sort_by(|a, b| key(a).cmp(&key(b)));
        }
        by_pair(&mut self.best_configs, |r| (&r.asset, &r.model));
        by_pair(&mut self.series, |r| (&r.asset, &r.model));
        by_pair(&mut self.metrics, |r| (&r.asset, &r.model));
        by_pair(&mut self.trials, |r| (&r.asset, &r.model));
        by_pair(&mut self.leaderboard, |r| (&r.asset, &r.model));
    }

    /// Appends every record of `other`.
    pub fn extend(&mut self, other: Self) {
        self.best_configs.extend(other.best_configs);
        self.series.extend(other.series);
        self.metrics.extend(other.metrics);
        self.trials.extend(other.trials);
        self.leaderboard.extend(other.leaderboard);
        self.global.extend(other.global);
    }

    /// Prediction series as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn predictions_frame(&self) -> Result<DataFrame> {
        let s = &self.series;
        Ok(df! {
            "asset" => s.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => s.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => s.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "fold" => s.iter().map(|r| r.fold as u64).collect::<Vec<_>>(),
            "date" => s.iter().map(|r| r.date).collect::<Vec<_>>(),
            "actual" => s.iter().map(|r| r.actual).collect::<Vec<_>>(),
            "predicted" => s.iter().map(|r| r.predicted).collect::<Vec<_>>(),
            "lower" => s.iter().map(|r| r.lower).collect::<Vec<_>>(),
            "upper" => s.iter().map(|r| r.upper).collect::<Vec<_>>(),
        }?)
    }

    /// Residual series (point forecasts only) as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn residuals_frame(&self) -> Result<DataFrame> {
        let s: Vec<&SeriesRecord> = self.series.iter().filter(|r| r.residual.is_some()).collect();
        Ok(df! {
            "asset" => s.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => s.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => s.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "fold" => s.iter().map(|r| r.fold as u64).collect::<Vec<_>>(),
            "date" => s.iter().map(|r| r.date).collect::<Vec<_>>(),
            "residual" => s.iter().map(|r| r.residual).collect::<Vec<_>>(),
        }?)
    }

    /// Fold and aggregate metrics as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn metrics_frame(&self) -> Result<DataFrame> {
        let m = &self.metrics;
        Ok(df! {
            "asset" => m.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => m.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => m.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "fold" => m.iter().map(|r| r.fold.as_str()).collect::<Vec<_>>(),
            "metric" => m.iter().map(|r| r.metric.as_str()).collect::<Vec<_>>(),
            "statistic" => m.iter().map(|r| r.statistic.as_str()).collect::<Vec<_>>(),
            "value" => m.iter().map(|r| r.value).collect::<Vec<_>>(),
            "start" => m.iter().map(|r| r.start).collect::<Vec<_>>(),
            "end" => m.iter().map(|r| r.end).collect::<Vec<_>>(),
        }?)
    }

    /// Selected configurations as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn configs_frame(&self) -> Result<DataFrame> {
        let c = &self.best_configs;
        Ok(df! {
            "asset" => c.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => c.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => c.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "trial" => c.iter().map(|r| r.trial.map(|t| t as u64)).collect::<Vec<_>>(),
            "params" => c.iter().map(|r| r.params.as_str()).collect::<Vec<_>>(),
            "objective" => c.iter().map(|r| r.objective).collect::<Vec<_>>(),
        }?)
    }

    /// Trial log as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn trials_frame(&self) -> Result<DataFrame> {
        let t = &self.trials;
        Ok(df! {
            "asset" => t.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => t.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => t.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "trial" => t.iter().map(|r| r.trial as u64).collect::<Vec<_>>(),
            "status" => t.iter().map(|r| r.status.as_str()).collect::<Vec<_>>(),
            "objective" => t.iter().map(|r| r.objective).collect::<Vec<_>>(),
            "folds_run" => t.iter().map(|r| r.folds_run as u64).collect::<Vec<_>>(),
            "pruned_at" => t.iter().map(|r| r.pruned_at.map(|f| f as u64)).collect::<Vec<_>>(),
            "params" => t.iter().map(|r| r.params.as_str()).collect::<Vec<_>>(),
        }?)
    }

    /// Per-asset leaderboards as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn leaderboard_frame(&self) -> Result<DataFrame> {
        let l = &self.leaderboard;
        Ok(df! {
            "asset" => l.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>(),
            "model" => l.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => l.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "rank" => l.iter().map(|r| r.rank.map(|k| k as u64)).collect::<Vec<_>>(),
            "status" => l.iter().map(|r| r.status.as_str()).collect::<Vec<_>>(),
            "metric" => l.iter().map(|r| r.metric.as_str()).collect::<Vec<_>>(),
            "value" => l.iter().map(|r| r.value).collect::<Vec<_>>(),
            "dispersion" => l.iter().map(|r| r.dispersion).collect::<Vec<_>>(),
            "reason" => l.iter().map(|r| r.reason.as_deref()).collect::<Vec<_>>(),
        }?)
    }

    /// Global leaderboard as a DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn global_frame(&self) -> Result<DataFrame> {
        let g = &self.global;
        Ok(df! {
            "position" => g.iter().map(|r| r.position as u64).collect::<Vec<_>>(),
            "model" => g.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            "family" => g.iter().map(|r| r.family.as_str()).collect::<Vec<_>>(),
            "mean_rank" => g.iter().map(|r| r.mean_rank).collect::<Vec<_>>(),
            "assets_ranked" => g.iter().map(|r| r.assets_ranked as u64).collect::<Vec<_>>(),
            "assets_excluded" => g.iter().map(|r| r.assets_excluded as u64).collect::<Vec<_>>(),
        }?)
    }

    /// Every table as a named DataFrame.
    ///
    /// # Errors
    ///
    /// Returns an error if any frame cannot be built.
    pub fn to_frames(&self) -> Result<BTreeMap<&'static str, DataFrame>> {
        Ok(BTreeMap::from([
            ("best_configs", self.configs_frame()?),
            ("predictions", self.predictions_frame()?),
            ("residuals", self.residuals_frame()?),
            ("metrics", self.metrics_frame()?),
            ("trials", self.trials_frame()?),
            ("leaderboard", self.leaderboard_frame()?),
            ("global_leaderboard", self.global_frame()?),
        ]))
    }
}

/// Destination for the artifacts of a pipeline run.
pub trait ArtifactSink {
    /// Writes the artifacts of pipeline `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifacts cannot be converted or stored.
    fn write(&mut self, pipeline: &str, artifacts: &ArtifactSet) -> Result<()>;
}

/// Keeps artifacts in memory as DataFrames keyed `pipeline/table`.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: BTreeMap<String, DataFrame>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored frame, e.g. `get("forecasting", "leaderboard")`.
    pub fn get(&self, pipeline: &str, table: &str) -> Option<&DataFrame> {
        self.frames.get(&format!("{pipeline}/{table}"))
    }

    /// Stored keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }
}

impl ArtifactSink for MemorySink {
    fn write(&mut self, pipeline: &str, artifacts: &ArtifactSet) -> Result<()> {
        for (table, frame) in artifacts.to_frames()? {
            self.frames.insert(format!("{pipeline}/{table}"), frame);
        }
        Ok(())
    }
}

/// Writes one JSON file per table under `root/pipeline/`.
#[derive(Debug, Clone)]
pub struct JsonSink {
    root: PathBuf,
}

impl JsonSink {
    /// Sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_table<T: Serialize>(&self, dir: &std::path::Path, table: &str, records: &[T]) -> Result<()> {
        let file = fs::File::create(dir.join(format!("{table}.json")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), records)?;
        Ok(())
    }
}

impl ArtifactSink for JsonSink {
    fn write(&mut self, pipeline: &str, artifacts: &ArtifactSet) -> Result<()> {
        let dir = self.root.join(pipeline);
        fs::create_dir_all(&dir)?;
        self.write_table(&dir, "best_configs", &artifacts.best_configs)?;
        self.write_table(&dir, "series", &artifacts.series)?;
        self.write_table(&dir, "metrics", &artifacts.metrics)?;
        self.write_table(&dir, "trials", &artifacts.trials)?;
        self.write_table(&dir, "leaderboard", &artifacts.leaderboard)?;
        self.write_table(&dir, "global_leaderboard", &artifacts.global)?;
        info!(pipeline, dir = %dir.display(), "Artifacts written");
        Ok(())
    }
}
