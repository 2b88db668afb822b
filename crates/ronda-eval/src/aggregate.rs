//! Aggregation of fold metrics into a per-run summary.

use std::collections::BTreeMap;

use ronda_traits::stats::mean_std;
use serde::{Deserialize, Serialize};

use crate::metrics::{FoldMetrics, Metric};

/// Mean and dispersion of one metric across valid folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStat {
    /// Mean over the folds that define the metric
    pub mean: f64,
    /// Sample standard deviation (zero for a single fold)
    pub std: f64,
    /// Number of folds contributing
    pub folds: usize,
}

/// Whether a summary carries any metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// At least one fold succeeded.
    Valid,
    /// Every fold failed, or there were none.
    NoValidFolds,
}

/// Aggregate of a walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Per-metric statistics
    pub metrics: BTreeMap<Metric, MetricStat>,
    /// Folds that were evaluated
    pub total_folds: usize,
    /// Folds that produced metrics
    pub valid_folds: usize,
    /// Folds that failed
    pub failed_folds: usize,
    /// Regression folds included in MAPE
    pub mape_included_folds: usize,
    /// Regression folds excluded from MAPE for near-zero actuals
    pub mape_excluded_folds: usize,
    /// Overall status
    pub status: SummaryStatus,
}

impl MetricSummary {
    /// Summarizes successful fold metrics alongside the failure count.
    ///
    /// MAPE inclusion counts only consider regression folds, i.e. folds that
    /// report MAE.
    pub fn from_folds<'a, I>(folds: I, failed_folds: usize) -> Self
    where
        I: IntoIterator<Item = &'a FoldMetrics>,
    {
        let mut samples: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();
        let mut valid = 0;
        let mut included = 0;
        let mut excluded = 0;

        for fold in folds {
            valid += 1;
            if fold.values.contains_key(&Metric::Mae) {
                if fold.mape_excluded {
                    excluded += 1;
                } else {
                    included += 1;
                }
            }
            for (metric, value) in &fold.values {
                if value.is_finite() {
                    samples.entry(*metric).or_default().push(*value);
                }
            }
        }

        let metrics = samples
            .into_iter()
            .map(|(metric, values)| {
                let (mean, std) = mean_std(&values);
                (
                    metric,
                    MetricStat {
                        mean,
                        std,
                        folds: values.len(),
                    },
                )
            })
            .collect();

        Self {
            metrics,
            total_folds: valid + failed_folds,
            valid_folds: valid,
            failed_folds,
            mape_included_folds: included,
            mape_excluded_folds: excluded,
            status: if valid > 0 {
                SummaryStatus::Valid
            } else {
                SummaryStatus::NoValidFolds
            },
        }
    }

    /// Mean of a metric, if any fold defined it.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).map(|s| s.mean)
    }

    /// Standard deviation of a metric, if any fold defined it.
    pub fn std(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).map(|s| s.std)
    }

    /// Whether at least one fold succeeded.
    pub fn is_valid(&self) -> bool {
        self.status == SummaryStatus::Valid
    }
}
