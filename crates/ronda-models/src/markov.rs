//! Probabilistic state models: observed-regime Markov chains and Gaussian
//! hidden Markov models.
//!
//! Both adapters forecast the expected next value under the state
//! distribution propagated through the transition matrix. State posteriors
//! are internal to the fitted model; callers only see point forecasts and
//! intervals.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use ronda_traits::stats::quantile;
use ronda_traits::{
    Capability, FittedModel, FrameView, Horizon, Interval, ModelAdapter, ModelConfiguration,
    ModelFamily, Prediction, Result, RondaError, SearchSpace, Task,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration key for the number of regimes.
pub const STATES_KEY: &str = "states";

/// Configuration key for the additive smoothing of transition counts.
pub const SMOOTHING_KEY: &str = "smoothing";

/// Configuration for [`MarkovChainAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkovChainConfig {
    /// Regimes used when the configuration has no `states` (default: 3).
    pub default_states: usize,
    /// Smoothing used when the configuration has no `smoothing` (default: 1.0).
    pub default_smoothing: f64,
}

impl Default for MarkovChainConfig {
    fn default() -> Self {
        Self {
            default_states: 3,
            default_smoothing: 1.0,
        }
    }
}

/// Markov chain over quantile-binned regimes of the target.
///
/// Regime boundaries are training quantiles; transition probabilities are
/// smoothed transition counts; each regime forecasts its training mean.
#[derive(Debug, Clone, Default)]
pub struct MarkovChainAdapter {
    config: MarkovChainConfig,
}

impl MarkovChainAdapter {
    /// Creates a new adapter with the given configuration.
    #[must_use]
    pub const fn new(config: MarkovChainConfig) -> Self {
        Self { config }
    }

    fn settings(&self, config: &ModelConfiguration) -> Result<(usize, f64)> {
        let states = config.usize_or(STATES_KEY, self.config.default_states)?;
        let smoothing = config.f64_or(SMOOTHING_KEY, self.config.default_smoothing)?;
        if states < 2 || smoothing < 0.0 {
            return Err(RondaError::InvalidConfig(format!(
                "markov chain needs at least 2 states and non-negative smoothing (states={states}, smoothing={smoothing})"
            )));
        }
        Ok((states, smoothing))
    }
}

impl ModelAdapter for MarkovChainAdapter {
    fn name(&self) -> &str {
        "markov_chain"
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Markov
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::PointForecast | Capability::MultiStep)
    }

    fn min_train_len(&self, config: &ModelConfiguration) -> usize {
        let (states, _) = self
            .settings(config)
            .unwrap_or((self.config.default_states, self.config.default_smoothing));
        states * 4 + 1
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
            .int(STATES_KEY, 2, 5)
            .float(SMOOTHING_KEY, 0.1, 5.0, true)
    }

    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        let (states, smoothing) = self.settings(config)?;
        train.ensure_trainable(self.min_train_len(config))?;
        let y = train.continuous_target()?.to_vec();

        let edges: Vec<f64> = (1..states)
            .map(|k| quantile(&y, k as f64 / states as f64))
            .collect();
        let regime = |v: f64| edges.iter().filter(|e| v > **e).count();
        let labels: Vec<usize> = y.iter().map(|&v| regime(v)).collect();

        let mut transition = Array2::from_elem((states, states), smoothing);
        for w in labels.windows(2) {
            transition[[w[0], w[1]]] += 1.0;
        }
        normalize_transition(&mut transition)?;

        let overall = y.iter().sum::<f64>() / y.len() as f64;
        let means = Array1::from_shape_fn(states, |s| {
            let members: Vec<f64> = y
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == s)
                .map(|(v, _)| *v)
                .collect();
            if members.is_empty() {
                overall
            } else {
                members.iter().sum::<f64>() / members.len() as f64
            }
        });

        let last_state = labels[labels.len() - 1];
        debug!(asset = train.asset(), states, "fitted markov chain");
        Ok(Box::new(FittedChain {
            edges,
            transition,
            means,
            last_state,
        }))
    }
}

fn normalize_transition(transition: &mut Array2<f64>) -> Result<()> {
    for (i, mut row) in transition.axis_iter_mut(Axis(0)).enumerate() {
        let total = row.sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(RondaError::ModelFit(format!(
                "regime {i} has no transitions; increase smoothing"
            )));
        }
        row.mapv_inplace(|p| p / total);
    }
    Ok(())
}

#[derive(Debug)]
struct FittedChain {
    edges: Vec<f64>,
    transition: Array2<f64>,
    means: Array1<f64>,
    last_state: usize,
}

impl FittedChain {
    fn regime(&self, value: f64) -> usize {
        self.edges.iter().filter(|e| value > **e).count()
    }
}

impl FittedModel for FittedChain {
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
        let actuals = view.continuous_target()?;
        let n_states = self.means.len();
        let mut values = Vec::with_capacity(view.len());

        for block in horizon.blocks(view.len()) {
            let state = if block.start == 0 {
                self.last_state
            } else {
                self.regime(actuals[block.start - 1])
            };
            let mut dist = Array1::zeros(n_states);
            dist[state] = 1.0;
            for _ in block {
                dist = dist.dot(&self.transition);
                values.push(dist.dot(&self.means));
            }
        }

        Ok(Prediction::point(Array1::from_vec(values)))
    }
}

/// Parameters of a hidden Markov model with one-dimensional Gaussian emissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianHmmParams {
    /// Initial state distribution.
    pub initial: Array1<f64>,
    /// Row-stochastic transition matrix.
    pub transition: Array2<f64>,
    /// Emission mean per state.
    pub means: Array1<f64>,
    /// Emission variance per state.
    pub variances: Array1<f64>,
}

impl GaussianHmmParams {
    /// Number of hidden states.
    pub fn n_states(&self) -> usize {
        self.initial.len()
    }

    /// Checks dimensions, stochasticity and positive variances.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let n = self.n_states();
        let fail = |msg: String| Err(RondaError::ModelFit(format!("invalid HMM parameters: {msg}")));
        if n == 0 {
            return fail("no states".to_string());
        }
        if self.transition.dim() != (n, n) || self.means.len() != n || self.variances.len() != n {
            return fail(format!("dimension mismatch for {n} states"));
        }
        if (self.initial.sum() - 1.0).abs() > 1e-6 {
            return fail("initial distribution does not sum to one".to_string());
        }
        if let Some(i) = self
            .transition
            .axis_iter(Axis(0))
            .position(|row| (row.sum() - 1.0).abs() > 1e-6 || row.iter().any(|p| *p < 0.0))
        {
            return fail(format!("transition row {i} is not a distribution"));
        }
        if self.variances.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return fail("variances must be positive".to_string());
        }
        Ok(())
    }

    fn density(&self, state: usize, x: f64) -> f64 {
        let var = self.variances[state];
        let diff = x - self.means[state];
        (-(diff * diff) / (2.0 * var)).exp() / (2.0 * std::f64::consts::PI * var).sqrt()
    }

    /// One forward-filter step: condition `prior` on observation `x`.
    ///
    /// An observation with negligible likelihood under every state leaves the
    /// prior unchanged.
    fn update(&self, prior: &Array1<f64>, x: f64) -> Array1<f64> {
        let joint = Array1::from_shape_fn(prior.len(), |j| prior[j] * self.density(j, x));
        let total = joint.sum();
        if total > 1e-300 && total.is_finite() {
            joint / total
        } else {
            prior.clone()
        }
    }

    fn filter(&self, observations: &[f64]) -> Array1<f64> {
        let mut posterior = self.initial.clone();
        for (t, &x) in observations.iter().enumerate() {
            let prior = if t == 0 {
                posterior
            } else {
                posterior.dot(&self.transition)
            };
            posterior = self.update(&prior, x);
        }
        posterior
    }
}

/// Estimates HMM parameters (Baum-Welch or any other external routine).
pub trait HiddenStateEstimator: Send + Sync + fmt::Debug {
    /// Model name, e.g. `"hmm"`.
    fn name(&self) -> &str;

    /// Shortest observation sequence the estimator accepts.
    fn min_observations(&self, config: &ModelConfiguration) -> usize;

    /// Default configuration space.
    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
    }

    /// Estimates parameters from the training observations.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::ModelFit`] when estimation does not converge.
    fn estimate(
        &self,
        observations: &[f64],
        config: &ModelConfiguration,
    ) -> Result<GaussianHmmParams>;
}

/// Configuration for [`HiddenMarkovAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenMarkovConfig {
    /// Normal quantile for prediction intervals (default: 1.96).
    pub interval_z: f64,
    /// Longest horizon served; `None` is unbounded.
    pub max_horizon: Option<usize>,
}

impl Default for HiddenMarkovConfig {
    fn default() -> Self {
        Self {
            interval_z: 1.96,
            max_horizon: None,
        }
    }
}

/// Adapter for Gaussian hidden Markov models.
///
/// Parameters come from the wrapped estimator; the adapter runs forward
/// filtering itself, first over the training window and then over each
/// validation actual once it is observable.
#[derive(Debug, Clone)]
pub struct HiddenMarkovAdapter<E> {
    estimator: E,
    config: HiddenMarkovConfig,
}

impl<E: HiddenStateEstimator> HiddenMarkovAdapter<E> {
    /// Creates an adapter around `estimator`.
    #[must_use]
    pub const fn new(estimator: E, config: HiddenMarkovConfig) -> Self {
        Self { estimator, config }
    }

    /// Creates an adapter with the default configuration.
    #[must_use]
    pub fn with_defaults(estimator: E) -> Self {
        Self::new(estimator, HiddenMarkovConfig::default())
    }
}

impl<E: HiddenStateEstimator> ModelAdapter for HiddenMarkovAdapter<E> {
    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Markov
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::PointForecast | Capability::PredictionInterval | Capability::MultiStep
        )
    }

    fn min_train_len(&self, config: &ModelConfiguration) -> usize {
        self.estimator.min_observations(config)
    }

    fn max_horizon(&self) -> Option<usize> {
        self.config.max_horizon
    }

    fn default_space(&self) -> SearchSpace {
        self.estimator.default_space()
    }

    fn fit(
        &self,
        train: &FrameView<'_>,
        config: &ModelConfiguration,
    ) -> Result<Box<dyn FittedModel>> {
        train.ensure_trainable(self.min_train_len(config))?;
        let y = train.continuous_target()?.to_vec();
        let params = self.estimator.estimate(&y, config)?;
        params.validate()?;
        let posterior = params.filter(&y);
        debug!(
            asset = train.asset(),
            model = self.name(),
            states = params.n_states(),
            "fitted hidden markov model"
        );
        Ok(Box::new(FittedHmm {
            params,
            posterior,
            interval_z: self.config.interval_z,
        }))
    }
}

#[derive(Debug)]
struct FittedHmm {
    params: GaussianHmmParams,
    posterior: Array1<f64>,
    interval_z: f64,
}

impl FittedModel for FittedHmm {
    fn predict(&self, view: &FrameView<'_>, horizon: Horizon) -> Result<Prediction> {
        let actuals = view.continuous_target()?;
        let p = &self.params;
        let mut posterior = self.posterior.clone();
        let mut values = Vec::with_capacity(view.len());
        let mut intervals = Vec::with_capacity(view.len());
        let mut observed = 0;

        for block in horizon.blocks(view.len()) {
            for &x in actuals.slice(ndarray::s![observed..block.start]) {
                if !x.is_finite() {
                    return Err(RondaError::ModelFit(format!(
                        "{}: non-finite observation while filtering",
                        view.asset()
                    )));
                }
                posterior = p.update(&posterior.dot(&p.transition), x);
            }
            observed = block.start;

            let mut dist = posterior.clone();
            for _ in block {
                dist = dist.dot(&p.transition);
                let mean = dist.dot(&p.means);
                let second = (0..p.n_states())
                    .map(|j| dist[j] * (p.variances[j] + p.means[j] * p.means[j]))
                    .sum::<f64>();
                let half = self.interval_z * (second - mean * mean).max(0.0).sqrt();
                values.push(mean);
                intervals.push(Interval {
                    lower: mean - half,
                    upper: mean + half,
                });
            }
        }

        Ok(Prediction::Point {
            values: Array1::from_vec(values),
            intervals: Some(intervals),
        })
    }
}
