//! Hyperparameter search for ronda.
//!
//! Trials are walk-forward runs of proposed configurations:
//! - [`Proposer`]: informed ([`TpeProposer`]), exhaustive ([`GridProposer`]) or random
//! - [`Pruner`]: stops trials whose running objective trails the best trial
//! - [`SearchBudget`] and [`CancelToken`]: bounded, cancellable searches
//!
//! Every trial, whatever its outcome, is kept as a [`TrialResult`].

pub mod proposer;
pub mod pruner;
pub mod search;

// Re-export main types
pub use proposer::{GridProposer, Proposer, RandomProposer, TpeConfig, TpeProposer};
pub use pruner::{NoPruning, Pruner, TrajectoryPruner};
pub use search::{
    CancelToken, HyperparameterSearch, SearchBudget, SearchConfig, SearchOutcome, TrialResult,
    TrialStatus,
};
