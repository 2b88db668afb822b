//! Per-fold forecast and classification metrics.
//!
//! Regression folds report MAE, RMSE, MAPE and directional accuracy.
//! Classification folds report accuracy, per-class precision/recall/F1,
//! their macro averages and ROC-AUC when probabilities are available.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;
use ronda_traits::Task;
use ronda_traits::stats::average_ranks;
use serde::{Deserialize, Serialize};

/// Configuration for metrics calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Folds with any `|actual|` below this are excluded from MAPE
    pub mape_epsilon: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { mape_epsilon: 1e-8 }
    }
}

/// Whether smaller or larger values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Error metrics.
    LowerIsBetter,
    /// Score metrics.
    HigherIsBetter,
}

/// A named fold metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Mean absolute error.
    Mae,
    /// Root mean square error.
    Rmse,
    /// Mean absolute percentage error, in percent.
    Mape,
    /// Share of rows whose predicted change has the sign of the actual change.
    DirectionalAccuracy,
    /// Share of correctly labelled rows.
    Accuracy,
    /// Unweighted mean of per-class precision.
    MacroPrecision,
    /// Unweighted mean of per-class recall.
    MacroRecall,
    /// Unweighted mean of per-class F1.
    MacroF1,
    /// Area under the ROC curve (one-vs-rest macro average for more than two classes).
    RocAuc,
}

impl Metric {
    /// All metrics in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Mae,
        Self::Rmse,
        Self::Mape,
        Self::DirectionalAccuracy,
        Self::Accuracy,
        Self::MacroPrecision,
        Self::MacroRecall,
        Self::MacroF1,
        Self::RocAuc,
    ];

    /// Which way is better.
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Mae | Self::Rmse | Self::Mape => Direction::LowerIsBetter,
            _ => Direction::HigherIsBetter,
        }
    }

    /// Task the metric applies to.
    pub const fn task(&self) -> Task {
        match self {
            Self::Mae | Self::Rmse | Self::Mape | Self::DirectionalAccuracy => Task::Regression,
            _ => Task::Classification,
        }
    }

    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mae => "mae",
            Self::Rmse => "rmse",
            Self::Mape => "mape",
            Self::DirectionalAccuracy => "directional_accuracy",
            Self::Accuracy => "accuracy",
            Self::MacroPrecision => "macro_precision",
            Self::MacroRecall => "macro_recall",
            Self::MacroF1 => "macro_f1",
            Self::RocAuc => "roc_auc",
        }
    }

    /// Whether `a` is strictly better than `b` under this metric.
    pub fn better(&self, a: f64, b: f64) -> bool {
        match self.direction() {
            Direction::LowerIsBetter => a < b,
            Direction::HigherIsBetter => a > b,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class label.
    pub class: usize,
    /// tp / (tp + fp), zero when nothing was predicted as this class.
    pub precision: f64,
    /// tp / (tp + fn), zero when the class never occurs.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Number of actual rows of this class.
    pub support: usize,
}

/// Metrics of one successful fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    /// Metric values; metrics that are undefined for the fold are absent.
    pub values: BTreeMap<Metric, f64>,
    /// Whether the fold was excluded from MAPE because of near-zero actuals.
    pub mape_excluded: bool,
    /// Per-class breakdown for classification folds.
    pub per_class: Vec<ClassMetrics>,
}

impl FoldMetrics {
    /// Value of a metric, if defined for this fold.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

/// Regression metrics for one fold.
///
/// `previous` is the actual that precedes the first validation row (the last
/// training actual); directional accuracy of the first row is measured
/// against it.
pub fn regression_metrics(
    actual: &[f64],
    predicted: &[f64],
    previous: Option<f64>,
    config: &MetricsConfig,
) -> FoldMetrics {
    let mut metrics = FoldMetrics::default();
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return metrics;
    }

    let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n as f64).sqrt();
    metrics.values.insert(Metric::Mae, mae);
    metrics.values.insert(Metric::Rmse, rmse);

    if actual.iter().any(|a| a.abs() < config.mape_epsilon) {
        metrics.mape_excluded = true;
    } else {
        let mape = actual
            .iter()
            .zip(&errors)
            .map(|(a, e)| (e / a).abs())
            .sum::<f64>()
            / n as f64
            * 100.0;
        metrics.values.insert(Metric::Mape, mape);
    }

    let mut hits = 0usize;
    let mut counted = 0usize;
    for i in 0..n {
        let prev = if i == 0 { previous } else { Some(actual[i - 1]) };
        if let Some(prev) = prev {
            counted += 1;
            if sign(predicted[i] - prev) == sign(actual[i] - prev) {
                hits += 1;
            }
        }
    }
    if counted > 0 {
        metrics
            .values
            .insert(Metric::DirectionalAccuracy, hits as f64 / counted as f64);
    }

    metrics
}

/// Classification metrics for one fold.
///
/// Macro averages run over classes that occur in either the actual or the
/// predicted labels. ROC-AUC is present only when `probabilities` is given
/// and at least one class has both positive and negative rows.
pub fn classification_metrics(
    actual: &[usize],
    predicted: &[usize],
    probabilities: Option<&Array2<f64>>,
    n_classes: usize,
) -> FoldMetrics {
    let mut metrics = FoldMetrics::default();
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return metrics;
    }

    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    metrics
        .values
        .insert(Metric::Accuracy, correct as f64 / n as f64);

    let n_classes = n_classes
        .max(actual.iter().chain(predicted).max().map_or(0, |m| m + 1));
    for class in 0..n_classes {
        let tp = (0..n)
            .filter(|&i| actual[i] == class && predicted[i] == class)
            .count();
        let predicted_pos = predicted[..n].iter().filter(|&&p| p == class).count();
        let support = actual[..n].iter().filter(|&&a| a == class).count();
        if support == 0 && predicted_pos == 0 {
            continue;
        }
        let precision = ratio(tp, predicted_pos);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        metrics.per_class.push(ClassMetrics {
            class,
            precision,
            recall,
            f1,
            support,
        });
    }

    if !metrics.per_class.is_empty() {
        let k = metrics.per_class.len() as f64;
        let mean = |f: fn(&ClassMetrics) -> f64| metrics.per_class.iter().map(f).sum::<f64>() / k;
        let (p, r, f1) = (mean(|c| c.precision), mean(|c| c.recall), mean(|c| c.f1));
        metrics.values.insert(Metric::MacroPrecision, p);
        metrics.values.insert(Metric::MacroRecall, r);
        metrics.values.insert(Metric::MacroF1, f1);
    }

    if let Some(auc) = probabilities.and_then(|probs| roc_auc(&actual[..n], probs)) {
        metrics.values.insert(Metric::RocAuc, auc);
    }

    metrics
}

// f64::signum maps 0.0 to 1.0; a flat move must only match a flat move.
fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// ROC-AUC from tie-averaged ranks (Mann-Whitney U).
///
/// Two columns are scored as binary with the second column as the positive
/// class; more columns are scored one-vs-rest and macro averaged over classes
/// with both positive and negative rows.
pub fn roc_auc(actual: &[usize], probabilities: &Array2<f64>) -> Option<f64> {
    let n_classes = probabilities.ncols();
    if probabilities.nrows() != actual.len() || n_classes < 2 {
        return None;
    }
    let classes: Vec<usize> = if n_classes == 2 {
        vec![1]
    } else {
        (0..n_classes).collect()
    };
    let aucs: Vec<f64> = classes
        .into_iter()
        .filter_map(|class| {
            let scores = probabilities.column(class).to_vec();
            let positive: Vec<bool> = actual.iter().map(|&a| a == class).collect();
            binary_auc(&positive, &scores)
        })
        .collect();
    if aucs.is_empty() {
        None
    } else {
        Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
    }
}

fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|p| **p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let ranks = average_ranks(scores);
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(positive)
        .filter(|(_, p)| **p)
        .map(|(r, _)| r)
        .sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}
