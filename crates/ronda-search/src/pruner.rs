//! Fold-level trial pruning.

use std::fmt;

use ronda_eval::{Direction, Metric};
use serde::{Deserialize, Serialize};

use crate::search::TrialResult;

/// Decides after each fold whether a trial should stop early.
pub trait Pruner: Send + Sync + fmt::Debug {
    /// `trajectory[i]` is the running objective after fold `i` of the current
    /// trial; `history` holds every trial recorded so far.
    fn should_prune(&self, trajectory: &[f64], history: &[TrialResult], objective: Metric) -> bool;
}

/// Never prunes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruning;

impl Pruner for NoPruning {
    fn should_prune(&self, _: &[f64], _: &[TrialResult], _: Metric) -> bool {
        false
    }
}

/// Compares the running objective with the best completed trial at the same
/// fold.
///
/// After `warmup_folds` folds, a trial is pruned when its running objective
/// is worse than the reference by more than `tolerance` (relative to the
/// reference magnitude).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrajectoryPruner {
    /// Folds that always run
    pub warmup_folds: usize,
    /// Relative slack before pruning
    pub tolerance: f64,
}

impl Default for TrajectoryPruner {
    fn default() -> Self {
        Self {
            warmup_folds: 2,
            tolerance: 0.1,
        }
    }
}

impl TrajectoryPruner {
    /// Create a new pruner.
    pub const fn new(warmup_folds: usize, tolerance: f64) -> Self {
        Self {
            warmup_folds,
            tolerance,
        }
    }
}

impl Pruner for TrajectoryPruner {
    fn should_prune(&self, trajectory: &[f64], history: &[TrialResult], objective: Metric) -> bool {
        let stage = trajectory.len();
        if stage <= self.warmup_folds {
            return false;
        }
        let Some(current) = trajectory.last().copied().filter(|v| v.is_finite()) else {
            return false;
        };

        let best = history
            .iter()
            .filter(|t| t.status.is_complete())
            .filter_map(|t| t.objective.filter(|v| v.is_finite()).map(|v| (t, v)))
            .reduce(|a, b| if objective.better(b.1, a.1) { b } else { a });
        let Some((best, _)) = best else {
            return false;
        };
        let Some(reference) = best
            .trajectory
            .get(stage - 1)
            .or_else(|| best.trajectory.last())
            .copied()
            .filter(|v| v.is_finite())
        else {
            return false;
        };

        let slack = self.tolerance * reference.abs();
        match objective.direction() {
            Direction::LowerIsBetter => current > reference + slack,
            Direction::HigherIsBetter => current < reference - slack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TrialStatus;
    use ronda_eval::MetricSummary;
    use ronda_traits::ModelConfiguration;

    fn completed(trajectory: Vec<f64>) -> TrialResult {
        TrialResult {
            asset: "A".into(),
            model: "m".into(),
            trial: 0,
            config: ModelConfiguration::new(),
            status: TrialStatus::Complete,
            summary: MetricSummary::from_folds(std::iter::empty(), 0),
            objective: trajectory.last().copied(),
            trajectory,
            folds: Vec::new(),
        }
    }

    #[test]
    fn test_warmup_and_tolerance() {
        let pruner = TrajectoryPruner::new(2, 0.1);
        let history = vec![completed(vec![1.0, 1.0, 1.0, 1.0])];
        assert!(!pruner.should_prune(&[5.0, 5.0], &history, Metric::Rmse));
        assert!(pruner.should_prune(&[5.0, 5.0, 5.0], &history, Metric::Rmse));
        assert!(!pruner.should_prune(&[1.0, 1.0, 1.05], &history, Metric::Rmse));
    }

    #[test]
    fn test_higher_is_better() {
        let pruner = TrajectoryPruner::new(1, 0.05);
        let history = vec![completed(vec![0.8, 0.8])];
        assert!(pruner.should_prune(&[0.5, 0.5], &history, Metric::Accuracy));
        assert!(!pruner.should_prune(&[0.9, 0.9], &history, Metric::Accuracy));
    }

    #[test]
    fn test_no_reference() {
        let pruner = TrajectoryPruner::default();
        assert!(!pruner.should_prune(&[9.0, 9.0, 9.0], &[], Metric::Rmse));
        assert!(!NoPruning.should_prune(&[9.0; 5], &[], Metric::Rmse));
    }
}
