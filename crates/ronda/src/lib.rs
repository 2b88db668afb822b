#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # ronda
//!
//! Walk-forward evaluation, hyperparameter search and cross-family ranking
//! for financial time-series models.
//!
//! ronda is an umbrella crate that re-exports the ronda sub-crates and adds
//! pipeline orchestration on top of them.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ronda::{EvaluationContext, FrameRegistry, Pipeline, PipelineConfig};
//! use ronda::models::{AdapterRegistry, Autoregressive, MarkovChainAdapter, StatisticalAdapter};
//!
//! # fn main() -> ronda::Result<()> {
//! let frames = FrameRegistry::new().with(aapl_frame)?.with(msft_frame)?;
//! let adapters = AdapterRegistry::new()
//!     .with(StatisticalAdapter::with_defaults(Autoregressive))?
//!     .with(MarkovChainAdapter::default())?;
//!
//! let pipeline = Pipeline::new(PipelineConfig::regression("forecasting"))?;
//! let report = pipeline.run(&EvaluationContext::new(frames, adapters))?;
//! let winner = report.leaderboards.asset("AAPL").and_then(|b| b.winner());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Organization
//!
//! - [`traits`] - Frames, configurations and the [`ModelAdapter`] contract
//! - [`models`] - Family adapters and the adapter registry
//! - [`eval`] - Fold generation, walk-forward execution and metrics
//! - [`search`] - Proposers, pruning and bounded searches
//! - [`rank`] - Leaderboards and artifacts
//!
//! ## Architecture
//!
//! 1. **Frames** hold one asset's features and target in time order
//! 2. **Adapters** wrap each model family behind a single fit/predict contract
//! 3. **The validator** walks folds forward and scores each one
//! 4. **The search** proposes configurations and prunes weak trials
//! 5. **The ranking engine** orders models per asset and across assets

/// Version information for the ronda crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod context;
pub mod pipeline;

/// Core types and the model adapter contract.
pub mod traits {
    pub use ronda_traits::*;
}

/// Model family adapters.
pub mod models {
    pub use ronda_models::*;
}

/// Walk-forward validation and metrics.
pub mod eval {
    pub use ronda_eval::*;
}

/// Hyperparameter search.
pub mod search {
    pub use ronda_search::*;
}

/// Leaderboards and artifacts.
pub mod rank {
    pub use ronda_rank::*;
}

// Re-export main types
pub use context::{EvaluationContext, FrameRegistry};
pub use pipeline::{
    PairOutcome, PairResult, Pipeline, PipelineConfig, PipelineReport, ProposerKind,
    SearchSettings,
};

// Re-export error and core types
pub use ronda_traits::{ModelAdapter, ModelFamily, Result, RondaError, Task, TimeSeriesFrame};
