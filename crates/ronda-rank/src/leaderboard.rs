//! Per-asset and global leaderboards.
//!
//! Ranking is a pure function of the evaluation records: records are
//! canonicalised by (asset, model) before sorting, so the same records always
//! yield the same leaderboards whatever order they arrive in.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use ronda_eval::{Direction, Metric, MetricSummary};
use ronda_traits::{AssetId, FailureKind, ModelFamily};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Metric entries are ordered by
    pub primary: Metric,
    /// Tie-breaking metric
    pub secondary: Option<Metric>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            primary: Metric::Rmse,
            secondary: Some(Metric::Mae),
        }
    }
}

impl RankingConfig {
    /// Classification defaults: accuracy, then macro F1.
    pub const fn classification() -> Self {
        Self {
            primary: Metric::Accuracy,
            secondary: Some(Metric::MacroF1),
        }
    }
}

/// Why a pair has no rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ExclusionReason {
    /// Every fold failed.
    NoValidFolds,
    /// No valid fold defined the primary metric.
    MissingMetric {
        /// The missing metric
        metric: Metric,
    },
    /// Evaluation stopped before producing a summary.
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable cause
        message: String,
    },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidFolds => f.write_str("no valid folds"),
            Self::MissingMetric { metric } => write!(f, "metric {metric} undefined"),
            Self::Failed { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

/// Input to the ranking engine: the outcome of evaluating one model on one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Asset identifier
    pub asset: AssetId,
    /// Model name
    pub model: String,
    /// Model family
    pub family: ModelFamily,
    /// Summary of the selected run, or why there is none
    pub outcome: RecordOutcome,
}

/// Evaluated summary or exclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// A metric summary was produced.
    Evaluated(MetricSummary),
    /// The pair could not be evaluated.
    Excluded(ExclusionReason),
}

impl EvaluationRecord {
    /// Record of an evaluated pair.
    pub fn evaluated(
        asset: impl Into<AssetId>,
        model: impl Into<String>,
        family: ModelFamily,
        summary: MetricSummary,
    ) -> Self {
        Self {
            asset: asset.into(),
            model: model.into(),
            family,
            outcome: RecordOutcome::Evaluated(summary),
        }
    }

    /// Record of an excluded pair.
    pub fn excluded(
        asset: impl Into<AssetId>,
        model: impl Into<String>,
        family: ModelFamily,
        reason: ExclusionReason,
    ) -> Self {
        Self {
            asset: asset.into(),
            model: model.into(),
            family,
            outcome: RecordOutcome::Excluded(reason),
        }
    }
}

/// Standing of a leaderboard entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum EntryStatus {
    /// Ranked with every fold successful.
    Ranked,
    /// Ranked, but some folds failed.
    PartiallyFailed {
        /// Number of failed folds
        failed_folds: usize,
    },
    /// Not ranked.
    Excluded {
        /// Why
        reason: ExclusionReason,
    },
}

impl EntryStatus {
    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ranked => "ranked",
            Self::PartiallyFailed { .. } => "partially_failed",
            Self::Excluded { .. } => "excluded",
        }
    }
}

/// One row of a per-asset leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Asset identifier
    pub asset: AssetId,
    /// Model name
    pub model: String,
    /// Model family
    pub family: ModelFamily,
    /// Mean value of each aggregated metric
    pub metrics: BTreeMap<Metric, f64>,
    /// Cross-fold standard deviation of the primary metric
    pub dispersion: Option<f64>,
    /// Folds with metrics
    pub valid_folds: usize,
    /// Failed folds
    pub failed_folds: usize,
    /// 1-based rank; `None` when excluded
    pub rank: Option<usize>,
    /// Standing
    pub status: EntryStatus,
}

/// Leaderboard of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLeaderboard {
    /// Asset identifier
    pub asset: AssetId,
    /// Ordering metric
    pub primary: Metric,
    /// Ranked entries first, then excluded entries by model name
    pub entries: Vec<LeaderboardEntry>,
}

impl AssetLeaderboard {
    /// Best-ranked entry.
    pub fn winner(&self) -> Option<&LeaderboardEntry> {
        self.entries.first().filter(|e| e.rank.is_some())
    }

    /// Entry of a model.
    pub fn entry(&self, model: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.model == model)
    }
}

/// One row of the global leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEntry {
    /// Model name
    pub model: String,
    /// Model family
    pub family: ModelFamily,
    /// Mean rank over the assets where the model was ranked
    pub mean_rank: Option<f64>,
    /// Assets where the model was ranked
    pub assets_ranked: usize,
    /// Assets where the model was excluded
    pub assets_excluded: usize,
    /// 1-based global position
    pub position: usize,
}

/// Models ordered across assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalLeaderboard {
    /// Ordering metric of the per-asset boards
    pub primary: Metric,
    /// Entries by mean rank
    pub entries: Vec<GlobalEntry>,
}

/// Per-asset boards plus the global board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboards {
    /// One board per asset, by asset identifier
    pub assets: Vec<AssetLeaderboard>,
    /// Cross-asset board
    pub global: GlobalLeaderboard,
}

impl Leaderboards {
    /// Board of one asset.
    pub fn asset(&self, asset: &str) -> Option<&AssetLeaderboard> {
        self.assets.iter().find(|b| b.asset == asset)
    }
}

/// Builds leaderboards from evaluation records.
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    /// Create a new ranking engine.
    pub const fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Ranking configuration.
    pub const fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Ranks every asset and the models across assets.
    ///
    /// Records are canonicalised by (asset, model); when a pair appears more
    /// than once the first record wins.
    pub fn rank(&self, records: &[EvaluationRecord]) -> Leaderboards {
        let mut by_asset: BTreeMap<&str, BTreeMap<&str, &EvaluationRecord>> = BTreeMap::new();
        for record in records {
            by_asset
                .entry(record.asset.as_str())
                .or_default()
                .entry(record.model.as_str())
                .or_insert(record);
        }

        let assets: Vec<AssetLeaderboard> = by_asset
            .into_iter()
            .map(|(asset, models)| {
                let canonical: Vec<&EvaluationRecord> = models.into_values().collect();
                self.rank_canonical(asset, &canonical)
            })
            .collect();
        let global = self.global(&assets);
        Leaderboards { assets, global }
    }

    /// Ranks the records of one asset; records of other assets are ignored.
    pub fn rank_asset(&self, asset: &str, records: &[EvaluationRecord]) -> AssetLeaderboard {
        let mut models: BTreeMap<&str, &EvaluationRecord> = BTreeMap::new();
        for record in records.iter().filter(|r| r.asset == asset) {
            models.entry(record.model.as_str()).or_insert(record);
        }
        let canonical: Vec<&EvaluationRecord> = models.into_values().collect();
        self.rank_canonical(asset, &canonical)
    }

    fn rank_canonical(&self, asset: &str, records: &[&EvaluationRecord]) -> AssetLeaderboard {
        let primary = self.config.primary;
        let mut ranked = Vec::new();
        let mut excluded = Vec::new();

        for record in records {
            let entry = self.entry(record);
            if matches!(entry.status, EntryStatus::Excluded { .. }) {
                excluded.push(entry);
            } else {
                ranked.push(entry);
            }
        }

        ranked.sort_by(|a, b| self.compare(a, b));
        for (i, entry) in ranked.iter_mut().enumerate() {
            entry.rank = Some(i + 1);
        }
        excluded.sort_by(|a, b| a.model.cmp(&b.model));

        debug!(
            asset,
            ranked = ranked.len(),
            excluded = excluded.len(),
            "Leaderboard built"
        );
        ranked.extend(excluded);
        AssetLeaderboard {
            asset: asset.to_string(),
            primary,
            entries: ranked,
        }
    }

    fn entry(&self, record: &EvaluationRecord) -> LeaderboardEntry {
        let primary = self.config.primary;
        let mut entry = LeaderboardEntry {
            asset: record.asset.clone(),
            model: record.model.clone(),
            family: record.family,
            metrics: BTreeMap::new(),
            dispersion: None,
            valid_folds: 0,
            failed_folds: 0,
            rank: None,
            status: EntryStatus::Ranked,
        };

        let summary = match &record.outcome {
            RecordOutcome::Evaluated(summary) => summary,
            RecordOutcome::Excluded(reason) => {
                entry.status = EntryStatus::Excluded {
                    reason: reason.clone(),
                };
                return entry;
            }
        };

        entry.metrics = summary.metrics.iter().map(|(m, s)| (*m, s.mean)).collect();
        entry.dispersion = summary.std(primary);
        entry.valid_folds = summary.valid_folds;
        entry.failed_folds = summary.failed_folds;
        entry.status = if !summary.is_valid() {
            EntryStatus::Excluded {
                reason: ExclusionReason::NoValidFolds,
            }
        } else if !entry.metrics.get(&primary).is_some_and(|v| v.is_finite()) {
            EntryStatus::Excluded {
                reason: ExclusionReason::MissingMetric { metric: primary },
            }
        } else if summary.failed_folds > 0 {
            EntryStatus::PartiallyFailed {
                failed_folds: summary.failed_folds,
            }
        } else {
            EntryStatus::Ranked
        };
        entry
    }

    fn compare(&self, a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
        let by_metric = |metric: Metric| {
            compare_values(
                a.metrics.get(&metric).copied(),
                b.metrics.get(&metric).copied(),
                metric.direction(),
            )
        };
        by_metric(self.config.primary)
            .then_with(|| {
                self.config
                    .secondary
                    .map_or(Ordering::Equal, by_metric)
            })
            .then_with(|| compare_values(a.dispersion, b.dispersion, Direction::LowerIsBetter))
            .then_with(|| a.model.cmp(&b.model))
    }

    fn global(&self, assets: &[AssetLeaderboard]) -> GlobalLeaderboard {
        struct Tally {
            family: ModelFamily,
            rank_sum: usize,
            ranked: usize,
            excluded: usize,
        }

        let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
        for board in assets {
            for entry in &board.entries {
                let tally = tallies.entry(entry.model.as_str()).or_insert(Tally {
                    family: entry.family,
                    rank_sum: 0,
                    ranked: 0,
                    excluded: 0,
                });
                match entry.rank {
                    Some(rank) => {
                        tally.rank_sum += rank;
                        tally.ranked += 1;
                    }
                    None => tally.excluded += 1,
                }
            }
        }

        let mut entries: Vec<GlobalEntry> = tallies
            .into_iter()
            .map(|(model, t)| GlobalEntry {
                model: model.to_string(),
                family: t.family,
                mean_rank: (t.ranked > 0).then(|| t.rank_sum as f64 / t.ranked as f64),
                assets_ranked: t.ranked,
                assets_excluded: t.excluded,
                position: 0,
            })
            .collect();
        entries.sort_by(|a, b| {
            compare_values(a.mean_rank, b.mean_rank, Direction::LowerIsBetter)
                .then_with(|| b.assets_ranked.cmp(&a.assets_ranked))
                .then_with(|| a.model.cmp(&b.model))
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.position = i + 1;
        }

        GlobalLeaderboard {
            primary: self.config.primary,
            entries,
        }
    }
}

/// Better values first; missing or non-finite values last.
fn compare_values(a: Option<f64>, b: Option<f64>, direction: Direction) -> Ordering {
    let a = a.filter(|v| v.is_finite());
    let b = b.filter(|v| v.is_finite());
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            Direction::LowerIsBetter => a.total_cmp(&b),
            Direction::HigherIsBetter => b.total_cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ronda_eval::{MetricsConfig, regression_metrics};

    fn summary(errors: &[(f64, f64)], failed: usize) -> MetricSummary {
        let config = MetricsConfig::default();
        let folds: Vec<_> = errors
            .iter()
            .map(|(a, p)| regression_metrics(&[*a, *a], &[*p, *p], None, &config))
            .collect();
        MetricSummary::from_folds(&folds, failed)
    }

    fn records() -> Vec<EvaluationRecord> {
        vec![
            EvaluationRecord::evaluated(
                "AAPL",
                "xgboost",
                ModelFamily::TreeEnsemble,
                summary(&[(10.0, 11.0), (10.0, 11.0)], 0),
            ),
            EvaluationRecord::evaluated(
                "AAPL",
                "arima",
                ModelFamily::Statistical,
                summary(&[(10.0, 10.5), (10.0, 10.5)], 1),
            ),
            EvaluationRecord::evaluated(
                "AAPL",
                "lstm",
                ModelFamily::DeepSequence,
                summary(&[], 4),
            ),
            EvaluationRecord::excluded(
                "MSFT",
                "arima",
                ModelFamily::Statistical,
                ExclusionReason::Failed {
                    kind: FailureKind::DataContract,
                    message: "duplicate timestamps".into(),
                },
            ),
            EvaluationRecord::evaluated(
                "MSFT",
                "xgboost",
                ModelFamily::TreeEnsemble,
                summary(&[(5.0, 5.2)], 0),
            ),
        ]
    }

    #[test]
    fn test_asset_ranking() {
        let boards = RankingEngine::default().rank(&records());
        let aapl = boards.asset("AAPL").unwrap();
        let order: Vec<_> = aapl.entries.iter().map(|e| e.model.as_str()).collect();
        assert_eq!(order, vec!["arima", "xgboost", "lstm"]);
        assert_eq!(aapl.winner().unwrap().model, "arima");
        assert_eq!(
            aapl.entry("arima").unwrap().status,
            EntryStatus::PartiallyFailed { failed_folds: 1 }
        );
        let lstm = aapl.entry("lstm").unwrap();
        assert_eq!(lstm.rank, None);
        assert_eq!(
            lstm.status,
            EntryStatus::Excluded {
                reason: ExclusionReason::NoValidFolds
            }
        );
    }

    #[test]
    fn test_global_ranking() {
        let boards = RankingEngine::default().rank(&records());
        let global = &boards.global.entries;
        assert_eq!(global[0].model, "arima");
        assert_eq!(global[0].mean_rank, Some(1.0));
        assert_eq!(global[0].assets_excluded, 1);
        assert_eq!(global[1].model, "xgboost");
        assert_eq!(global[1].mean_rank, Some(1.5));
        assert_eq!(global[1].assets_ranked, 2);
        assert_eq!(global.last().unwrap().model, "lstm");
        assert_eq!(global.last().unwrap().mean_rank, None);
    }

    #[test]
    fn test_idempotent_under_reordering() {
        let engine = RankingEngine::default();
        let forward = engine.rank(&records());
        let mut reversed = records();
        reversed.reverse();
        assert_eq!(forward, engine.rank(&reversed));
        assert_eq!(forward, engine.rank(&records()));
    }

    #[test]
    fn test_dispersion_breaks_ties() {
        let engine = RankingEngine::new(RankingConfig {
            primary: Metric::Mae,
            secondary: None,
        });
        let steady = summary(&[(10.0, 11.0), (10.0, 11.0)], 0);
        let noisy = summary(&[(10.0, 10.5), (10.0, 11.5)], 0);
        let board = engine.rank_asset(
            "X",
            &[
                EvaluationRecord::evaluated("X", "a_noisy", ModelFamily::Markov, noisy),
                EvaluationRecord::evaluated("X", "b_steady", ModelFamily::Markov, steady),
            ],
        );
        assert_eq!(board.entries[0].model, "b_steady");
        assert_eq!(board.entries[1].rank, Some(2));
    }

    #[test]
    fn test_missing_primary_excluded() {
        let engine = RankingEngine::new(RankingConfig::classification());
        let board = engine.rank_asset(
            "X",
            &[EvaluationRecord::evaluated(
                "X",
                "arima",
                ModelFamily::Statistical,
                summary(&[(1.0, 2.0)], 0),
            )],
        );
        assert_eq!(
            board.entries[0].status,
            EntryStatus::Excluded {
                reason: ExclusionReason::MissingMetric {
                    metric: Metric::Accuracy
                }
            }
        );
        assert!(board.winner().is_none());
    }
}
