//! Leaderboards and artifacts for ronda.
//!
//! - [`RankingEngine`]: per-asset leaderboards over evaluation records, plus a
//!   global leaderboard by mean rank across assets
//! - [`ArtifactSet`]: flat record sets (best configurations, predictions,
//!   residuals, metrics, trial logs, leaderboards) convertible to DataFrames
//! - [`ArtifactSink`]: where artifacts go ([`MemorySink`], [`JsonSink`])
//!
//! # Example
//!
//! ```rust,ignore
//! use ronda_rank::{EvaluationRecord, RankingEngine};
//!
//! let boards = RankingEngine::default().rank(&records);
//! let winner = boards.asset("AAPL").and_then(|b| b.winner());
//! ```

pub mod artifacts;
pub mod leaderboard;

// Re-export main types
pub use artifacts::{
    AGGREGATE, ArtifactSet, ArtifactSink, ConfigRecord, GlobalRecord, JsonSink, LeaderboardRecord,
    MemorySink, MetricRecord, SeriesRecord, TrialRecord,
};
pub use leaderboard::{
    AssetLeaderboard, EntryStatus, EvaluationRecord, ExclusionReason, GlobalEntry,
    GlobalLeaderboard, LeaderboardEntry, Leaderboards, RankingConfig, RankingEngine,
    RecordOutcome,
};
