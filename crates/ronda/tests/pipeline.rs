//! End-to-end pipeline scenarios.

mod common;

use approx::assert_relative_eq;
use common::{Broken, Drift, direction_frame, trend_frame};
use ronda::eval::{FoldPolicy, Metric, SummaryStatus, ValidatorConfig};
use ronda::models::{AdapterRegistry, MarkovChainAdapter};
use ronda::rank::{EntryStatus, ExclusionReason, MemorySink, RankingEngine};
use ronda::search::SearchBudget;
use ronda::traits::{FailureKind, ModelFamily};
use ronda::{
    EvaluationContext, FrameRegistry, PairOutcome, Pipeline, PipelineConfig, ProposerKind,
    SearchSettings,
};

fn context(assets: &[&str]) -> EvaluationContext {
    let mut frames = FrameRegistry::new();
    for asset in assets {
        frames.insert(trend_frame(asset, 100)).unwrap();
    }
    let adapters = AdapterRegistry::new()
        .with(Drift {
            name: "drift",
            family: ModelFamily::DeepSequence,
        })
        .unwrap()
        .with(MarkovChainAdapter::default())
        .unwrap()
        .with(Broken)
        .unwrap();
    EvaluationContext::new(frames, adapters)
}

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap()
}

fn single_run(name: &str) -> PipelineConfig {
    PipelineConfig::regression(name)
        .with_validator(ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5)))
        .with_search(SearchSettings::disabled())
}

#[test]
fn test_every_pair_gets_eight_ordered_folds() {
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&context(&["AAPL"]))
        .unwrap();
    assert_eq!(report.results.len(), 3);

    let PairOutcome::Validated(run) = &report.result("AAPL", "drift").unwrap().outcome else {
        panic!("drift should run once");
    };
    assert_eq!(run.planned_folds, 8);
    assert_eq!(run.folds.len(), 8);
    for fold in &run.folds {
        assert!(fold.fold.train.end <= fold.fold.validation.start);
        assert!(fold.train_end < fold.validation_start);
    }
    for pair in run.folds.windows(2) {
        assert!(pair[0].validation_end < pair[1].validation_end);
    }
    assert_eq!(run.folds.last().unwrap().fold.validation.end, 100);
}

#[test]
fn test_always_failing_model_is_excluded() {
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&context(&["AAPL", "MSFT"]))
        .unwrap();

    let PairOutcome::Validated(run) = &report.result("AAPL", "broken").unwrap().outcome else {
        panic!("broken should still be validated");
    };
    assert_eq!(run.folds.len(), 8);
    assert_eq!(run.failed_folds(), 8);
    let summary = run.summary();
    assert_eq!(summary.valid_folds, 0);
    assert_eq!(summary.status, SummaryStatus::NoValidFolds);

    for asset in ["AAPL", "MSFT"] {
        let board = report.leaderboards.asset(asset).unwrap();
        let entry = board.entry("broken").unwrap();
        assert_eq!(entry.rank, None);
        assert_eq!(
            entry.status,
            EntryStatus::Excluded {
                reason: ExclusionReason::NoValidFolds
            }
        );
        assert_eq!(board.entries.last().unwrap().model, "broken");
    }

    let global = &report.leaderboards.global;
    let broken = global.entries.iter().find(|e| e.model == "broken").unwrap();
    assert_eq!(broken.assets_ranked, 0);
    assert_eq!(broken.assets_excluded, 2);
    assert_eq!(broken.mean_rank, None);
}

#[test]
fn test_lower_rmse_wins_regardless_of_family() {
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&context(&["AAPL"]))
        .unwrap();
    let board = report.leaderboards.asset("AAPL").unwrap();
    assert_eq!(board.primary, Metric::Rmse);

    let winner = board.winner().unwrap();
    assert_eq!(winner.model, "drift");
    assert_eq!(winner.family, ModelFamily::DeepSequence);
    assert_eq!(winner.rank, Some(1));

    let markov = board.entry("markov_chain").unwrap();
    assert_eq!(markov.family, ModelFamily::Markov);
    assert_eq!(markov.rank, Some(2));
    assert!(winner.metrics[&Metric::Rmse] < markov.metrics[&Metric::Rmse]);

    let global = &report.leaderboards.global.entries[0];
    assert_eq!(global.model, "drift");
    assert_relative_eq!(global.mean_rank.unwrap(), 1.0);
}

#[test]
fn test_search_keeps_pruned_trials() {
    let mut settings = SearchSettings {
        proposer: ProposerKind::Random,
        ..SearchSettings::default()
    };
    settings.config.budget = SearchBudget::trials(10);
    let config = PipelineConfig::regression("forecasting")
        .with_models(["drift"])
        .with_validator(ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5)))
        .with_search(settings);
    let report = Pipeline::new(config)
        .unwrap()
        .run(&context(&["AAPL"]))
        .unwrap();

    let PairOutcome::Searched(search) = &report.result("AAPL", "drift").unwrap().outcome else {
        panic!("drift should be searched");
    };
    assert_eq!(search.trials.len(), 10);
    assert_eq!(search.count("complete") + search.count("pruned"), 10);
    let best = search.best().unwrap();
    assert!(best.status.is_complete());

    let logged = report
        .artifacts
        .trials
        .iter()
        .filter(|t| t.asset == "AAPL" && t.model == "drift")
        .count();
    assert_eq!(logged, 10);
    let selected = &report.artifacts.best_configs[0];
    assert_eq!(selected.trial, Some(best.trial));
    assert_eq!(selected.params, best.config.key());
}

#[test]
fn test_failed_search_is_excluded() {
    let config = PipelineConfig::regression("forecasting")
        .with_models(["broken", "drift"])
        .with_validator(ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5)));
    let report = Pipeline::new(config)
        .unwrap()
        .run(&context(&["AAPL"]))
        .unwrap();

    let board = report.leaderboards.asset("AAPL").unwrap();
    assert_eq!(board.winner().unwrap().model, "drift");
    let EntryStatus::Excluded {
        reason: ExclusionReason::Failed { kind, .. },
    } = &board.entry("broken").unwrap().status
    else {
        panic!("broken should be excluded");
    };
    assert_eq!(*kind, FailureKind::SearchExhausted);
}

#[test]
fn test_task_mismatch_excludes_only_that_asset() {
    let mut ctx = context(&["AAPL"]);
    ctx.frames.insert(direction_frame("BTC", 100)).unwrap();
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&ctx)
        .unwrap();

    let btc = report.leaderboards.asset("BTC").unwrap();
    assert!(btc.entries.iter().all(|e| e.rank.is_none()));
    assert!(btc.entries.iter().all(|e| matches!(
        &e.status,
        EntryStatus::Excluded {
            reason: ExclusionReason::Failed {
                kind: FailureKind::DataContract,
                ..
            }
        }
    )));
    assert_eq!(
        report.leaderboards.asset("AAPL").unwrap().winner().unwrap().model,
        "drift"
    );
}

#[test]
fn test_runs_are_deterministic() {
    let mut settings = SearchSettings::default();
    settings.config.budget = SearchBudget::trials(6);
    let config = PipelineConfig::regression("forecasting")
        .with_models(["drift", "markov_chain"])
        .with_validator(ValidatorConfig::with_policy(FoldPolicy::expanding(60, 5, 5)))
        .with_search(settings);
    let pipeline = Pipeline::new(config).unwrap();
    let ctx = context(&["AAPL", "MSFT"]);

    let first = pipeline.run(&ctx).unwrap();
    let second = pipeline.run(&ctx).unwrap();
    // compared as JSON so NaN trajectory entries of unscored folds compare equal
    assert_eq!(json(&first.results), json(&second.results));
    assert_eq!(json(&first.leaderboards), json(&second.leaderboards));
    assert_eq!(json(&first.artifacts), json(&second.artifacts));
}

#[test]
fn test_ranking_is_idempotent() {
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&context(&["AAPL", "MSFT", "NVDA"]))
        .unwrap();
    let records: Vec<_> = report.results.iter().map(|r| r.record()).collect();
    let mut reversed = records.clone();
    reversed.reverse();

    let engine = RankingEngine::default();
    assert_eq!(engine.rank(&records), engine.rank(&reversed));
    assert_eq!(engine.rank(&records), report.leaderboards);
}

#[test]
fn test_artifacts_reach_the_sink() {
    let report = Pipeline::new(single_run("forecasting"))
        .unwrap()
        .run(&context(&["AAPL"]))
        .unwrap();
    let mut sink = MemorySink::new();
    report.write_artifacts(&mut sink).unwrap();

    // three models, each ranked or excluded once
    assert_eq!(sink.get("forecasting", "leaderboard").unwrap().height(), 3);
    // drift and markov_chain each predict 40 validation rows
    assert_eq!(sink.get("forecasting", "predictions").unwrap().height(), 80);
    assert_eq!(sink.get("forecasting", "best_configs").unwrap().height(), 3);
    assert_eq!(sink.get("forecasting", "trials").unwrap().height(), 0);

    for table in ["predictions", "residuals", "metrics", "best_configs", "trials"] {
        let frame = sink.get("forecasting", table).unwrap();
        assert!(frame.column("family").is_ok(), "{table} lacks a family column");
    }
    let predictions = sink.get("forecasting", "predictions").unwrap();
    let families = predictions.column("family").unwrap().as_materialized_series();
    let families: Vec<_> = families.str().unwrap().into_iter().flatten().collect();
    assert!(families.contains(&ModelFamily::DeepSequence.as_str()));
    assert!(families.contains(&ModelFamily::Markov.as_str()));
}
