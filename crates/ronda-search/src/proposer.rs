//! Configuration proposers.
//!
//! A proposer is a pure function of the search space, the trials recorded so
//! far and the trial index: the same history always yields the same proposal.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ronda_eval::Metric;
use ronda_traits::{ModelConfiguration, SearchSpace};
use serde::{Deserialize, Serialize};

use crate::search::TrialResult;

/// Proposes the configuration of the next trial.
pub trait Proposer: Send + Sync + fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Configuration for trial `trial`, or `None` when the proposer has
    /// nothing left to try.
    fn propose(
        &self,
        space: &SearchSpace,
        history: &[TrialResult],
        trial: usize,
        objective: Metric,
    ) -> Option<ModelConfiguration>;
}

/// Per-trial generator derived from a base seed.
fn trial_rng(seed: u64, trial: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ (trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn random_units(rng: &mut ChaCha8Rng, dims: usize) -> Vec<f64> {
    (0..dims).map(|_| rng.random::<f64>()).collect()
}

/// Exhaustive search over a discretised space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridProposer {
    /// Levels per continuous parameter
    pub levels: usize,
}

impl Default for GridProposer {
    fn default() -> Self {
        Self { levels: 5 }
    }
}

impl Proposer for GridProposer {
    fn name(&self) -> &str {
        "grid"
    }

    fn propose(
        &self,
        space: &SearchSpace,
        _history: &[TrialResult],
        trial: usize,
        _objective: Metric,
    ) -> Option<ModelConfiguration> {
        space.grid(self.levels).into_iter().nth(trial)
    }
}

/// Independent uniform sampling in unit space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomProposer {
    /// Base seed
    pub seed: u64,
}

impl Proposer for RandomProposer {
    fn name(&self) -> &str {
        "random"
    }

    fn propose(
        &self,
        space: &SearchSpace,
        _history: &[TrialResult],
        trial: usize,
        _objective: Metric,
    ) -> Option<ModelConfiguration> {
        let mut rng = trial_rng(self.seed, trial);
        Some(space.from_units(&random_units(&mut rng, space.len())))
    }
}

/// Tree-structured Parzen estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpeConfig {
    /// Base seed
    pub seed: u64,
    /// Completed trials sampled at random before the density model is used
    pub n_startup: usize,
    /// Share of completed trials treated as good
    pub gamma: f64,
    /// Candidates drawn from the good density per proposal
    pub n_candidates: usize,
    /// Kernel bandwidth in unit space
    pub bandwidth: f64,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_startup: 5,
            gamma: 0.25,
            n_candidates: 24,
            bandwidth: 0.15,
        }
    }
}

/// Informed proposer: samples where completed good trials are dense and bad
/// trials are sparse.
///
/// Completed trials are split into good and bad by objective; candidates are
/// drawn around good points and the one with the largest good/bad density
/// ratio is proposed. Densities are Gaussian kernels in unit space mixed
/// with a uniform prior.
#[derive(Debug, Clone, Default)]
pub struct TpeProposer {
    config: TpeConfig,
}

impl TpeProposer {
    /// Create a new TPE proposer.
    pub const fn new(config: TpeConfig) -> Self {
        Self { config }
    }

    fn observations(
        space: &SearchSpace,
        history: &[TrialResult],
        objective: Metric,
    ) -> Vec<(Vec<f64>, f64)> {
        let mut observed: Vec<(Vec<f64>, f64)> = history
            .iter()
            .filter(|t| t.status.is_complete())
            .filter_map(|t| {
                let value = t.objective.filter(|v| v.is_finite())?;
                Some((space.to_units(&t.config)?, value))
            })
            .collect();
        observed.sort_by(|a, b| {
            if objective.better(a.1, b.1) {
                std::cmp::Ordering::Less
            } else if objective.better(b.1, a.1) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
        observed
    }

    fn density(&self, x: &[f64], points: &[&Vec<f64>]) -> f64 {
        let bw = self.config.bandwidth.max(1e-3);
        let norm = 1.0 / (bw * (2.0 * std::f64::consts::PI).sqrt());
        let kernel_sum: f64 = points
            .iter()
            .map(|p| {
                x.iter()
                    .zip(p.iter())
                    .map(|(a, b)| norm * (-0.5 * ((a - b) / bw).powi(2)).exp())
                    .product::<f64>()
            })
            .sum();
        // uniform prior counts as one extra point with density 1
        (kernel_sum + 1.0) / (points.len() as f64 + 1.0)
    }
}

impl Proposer for TpeProposer {
    fn name(&self) -> &str {
        "tpe"
    }

    fn propose(
        &self,
        space: &SearchSpace,
        history: &[TrialResult],
        trial: usize,
        objective: Metric,
    ) -> Option<ModelConfiguration> {
        let mut rng = trial_rng(self.config.seed, trial);
        let dims = space.len();
        let observed = Self::observations(space, history, objective);
        if dims == 0 || observed.len() < self.config.n_startup.max(2) {
            return Some(space.from_units(&random_units(&mut rng, dims)));
        }

        let n_good = ((self.config.gamma * observed.len() as f64).ceil() as usize)
            .clamp(1, observed.len() - 1);
        let good: Vec<&Vec<f64>> = observed[..n_good].iter().map(|(u, _)| u).collect();
        let bad: Vec<&Vec<f64>> = observed[n_good..].iter().map(|(u, _)| u).collect();

        let mut best: Option<(Vec<f64>, f64)> = None;
        for _ in 0..self.config.n_candidates.max(1) {
            let center = good[rng.random_range(0..good.len())];
            let candidate: Vec<f64> = center
                .iter()
                .map(|c| {
                    let jitter = (rng.random::<f64>() - 0.5) * 2.0 * self.config.bandwidth;
                    (c + jitter).clamp(0.0, 1.0)
                })
                .collect();
            let score = self.density(&candidate, &good) / self.density(&candidate, &bad);
            if best.as_ref().is_none_or(|(_, s)| score > *s) {
                best = Some((candidate, score));
            }
        }
        best.map(|(units, _)| space.from_units(&units))
    }
}
