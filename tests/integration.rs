mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

use signal_sentry::feeds::{
    MarketFeed, NewsFeed, NewsItem, PerformanceSource, ReplayFeed, StrategyPerf,
};
use signal_sentry::models::{BlockedReason, Outcome, Side, SignalStatus};
use signal_sentry::pipeline::ValidationPipeline;
use signal_sentry::risk::{ChallengeConfig, ChallengeStatus, SafetyStatus};
use signal_sentry::scoring::{ScoringEngine, ScoringWeights, WeightsStore};
use signal_sentry::store::SentryStore;

use common::{make_signal, test_config, test_limits, test_time};

/// A feed whose lookups always fail, to exercise the fail-open path.
struct BrokenFeed;

#[async_trait]
impl NewsFeed for BrokenFeed {
    async fn recent_news(&self, _symbol: &str, _window_minutes: i64) -> Result<Vec<NewsItem>> {
        anyhow::bail!("feed service unreachable")
    }
}

#[async_trait]
impl MarketFeed for BrokenFeed {
    async fn recent_prices(&self, _symbol: &str, _window_minutes: i64) -> Result<Vec<f64>> {
        anyhow::bail!("feed service unreachable")
    }
}

#[async_trait]
impl PerformanceSource for BrokenFeed {
    async fn strategy_performance(&self, _strategy: &str, _symbol: &str) -> Result<StrategyPerf> {
        anyhow::bail!("feed service unreachable")
    }
}

struct Harness {
    pipeline: ValidationPipeline,
    store: Arc<SentryStore>,
    weights: Arc<WeightsStore>,
}

fn build_harness(feed: Arc<ReplayFeed>) -> Harness {
    let cfg = test_config();
    let store = Arc::new(SentryStore::in_memory(test_limits()));
    let weights = Arc::new(WeightsStore::with_defaults("v1", cfg.min_score_threshold));
    let engine = ScoringEngine::new(
        &cfg,
        feed.clone(),
        feed.clone(),
        store.clone(),
        weights.clone(),
    );
    let pipeline = ValidationPipeline::new(&cfg, engine, store.clone(), feed);
    Harness {
        pipeline,
        store,
        weights,
    }
}

#[tokio::test]
async fn full_pipeline_with_rich_context() {
    let feed = Arc::new(ReplayFeed::new(test_time()));

    // Calm drifting prices, mildly bullish news, a proven strategy
    let prices: Vec<_> = (0..30)
        .map(|i| {
            (
                test_time() - Duration::minutes(30 - i),
                50000.0 + i as f64 * 2.0,
            )
        })
        .collect();
    feed.load_prices("BTC-USD", prices);
    feed.load_news(
        "BTC-USD",
        vec![
            NewsItem {
                sentiment: 0.5,
                timestamp: test_time() - Duration::minutes(45),
                currency: "USD".to_string(),
            },
            NewsItem {
                sentiment: 0.3,
                timestamp: test_time() - Duration::minutes(90),
                currency: "USD".to_string(),
            },
        ],
    );

    let harness = build_harness(feed);

    let mut signal = make_signal("sig-1", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
    signal.confidence = 85.0;

    // Seed the performance store through real settlements
    {
        let entry = harness.store.account("acct-1").await;
        let mut account = entry.lock().await;
        for i in 0..12 {
            account.signal_log.push(signal_sentry::store::SignalRecord {
                id: format!("hist-{}", i),
                received_at: test_time() - Duration::days(10) + Duration::minutes(i),
                symbol: "BTC-USD".to_string(),
                strategy: "trend_momentum".to_string(),
                passed: true,
                status: SignalStatus::Approved,
                outcome: Outcome::Pending,
            });
        }
    }
    for i in 0..12 {
        let outcome = if i < 10 { Outcome::Win } else { Outcome::Loss };
        let pnl = if i < 10 { 80.0 } else { -40.0 };
        harness
            .store
            .record_outcome(
                "acct-1",
                &format!("hist-{}", i),
                outcome,
                pnl,
                test_time() - Duration::days(10) + Duration::hours(2),
            )
            .await
            .unwrap();
    }

    let evaluation = harness.pipeline.evaluate(&signal).await.unwrap();

    assert!(evaluation.passed, "notes: {:?}", evaluation.notes);
    assert_eq!(evaluation.blocked_reason, BlockedReason::Passed);
    assert_eq!(evaluation.status, SignalStatus::Approved);
    // Every factor was measured, nothing fell back to neutral
    assert!(!evaluation.degraded, "notes: {:?}", evaluation.notes);
    assert_eq!(harness.store.evaluation_count().await, 1);
}

#[tokio::test]
async fn broken_feeds_degrade_but_never_block() {
    let cfg = test_config();
    let store = Arc::new(SentryStore::in_memory(test_limits()));
    let weights = Arc::new(WeightsStore::with_defaults("v1", cfg.min_score_threshold));
    let feed = Arc::new(BrokenFeed);
    let engine = ScoringEngine::new(&cfg, feed.clone(), feed.clone(), feed.clone(), weights);
    let pipeline = ValidationPipeline::new(&cfg, engine, store.clone(), feed);

    let mut signal = make_signal("sig-1", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
    signal.confidence = 85.0;

    let evaluation = pipeline.evaluate(&signal).await.unwrap();

    // All lookups failed, yet an evaluation is produced from neutral
    // fallbacks and still clears every check
    assert!(evaluation.passed);
    assert!(evaluation.degraded);
    assert!(evaluation.final_score >= 80.0);
    assert!(evaluation
        .notes
        .iter()
        .any(|n| n.contains("neutral applied")));
}

#[tokio::test]
async fn loss_streak_halts_and_lifts_next_day() {
    let feed = Arc::new(ReplayFeed::new(test_time()));
    let harness = build_harness(feed);

    for i in 0..3 {
        let mut sig = make_signal(
            &format!("sig-{}", i),
            "acct-1",
            Side::Buy,
            50000.0,
            49500.0,
            51000.0,
        );
        sig.confidence = 85.0;
        sig.received_at = test_time() + Duration::minutes(i * 3);
        assert!(harness.pipeline.evaluate(&sig).await.unwrap().passed);
        harness
            .store
            .record_outcome(
                "acct-1",
                &format!("sig-{}", i),
                Outcome::Loss,
                -50.0,
                test_time() + Duration::minutes(i * 3 + 1),
            )
            .await
            .unwrap();
    }

    {
        let entry = harness.store.account("acct-1").await;
        let account = entry.lock().await;
        assert!(account.risk.is_halted);
        assert_eq!(
            account.risk.halt_reason,
            "Consecutive loss limit reached (3/3)"
        );
    }

    // Same day: blocked by the halt
    let mut blocked = make_signal("sig-4", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
    blocked.confidence = 85.0;
    blocked.received_at = test_time() + Duration::hours(1);
    let evaluation = harness.pipeline.evaluate(&blocked).await.unwrap();
    assert!(!evaluation.passed);
    assert_eq!(evaluation.blocked_reason, BlockedReason::AccountRule);

    // Next UTC day: halt lifts automatically and the streak window rolls
    let mut fresh = make_signal("sig-5", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
    fresh.confidence = 85.0;
    fresh.received_at = test_time() + Duration::days(1);
    let evaluation = harness.pipeline.evaluate(&fresh).await.unwrap();
    assert!(evaluation.passed, "notes: {:?}", evaluation.notes);
}

#[tokio::test]
async fn challenge_lifecycle_pass() {
    let feed = Arc::new(ReplayFeed::new(test_time()));
    let harness = build_harness(feed);

    harness
        .store
        .activate_challenge(
            "acct-1",
            ChallengeConfig {
                account_size: 10000.0,
                max_daily_loss_pct: 5.0,
                max_overall_loss_pct: 10.0,
                min_trading_days: 5,
                profit_target_pct: 10.0,
            },
        )
        .await;

    // One winning trade per day for five days
    for day in 0..5 {
        let id = format!("sig-{}", day);
        let mut sig = make_signal(&id, "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        sig.confidence = 85.0;
        sig.received_at = test_time() + Duration::days(day);
        assert!(harness.pipeline.evaluate(&sig).await.unwrap().passed);
        harness
            .store
            .record_outcome(
                "acct-1",
                &id,
                Outcome::Win,
                200.0,
                test_time() + Duration::days(day) + Duration::hours(2),
            )
            .await
            .unwrap();
    }

    let entry = harness.store.account("acct-1").await;
    let account = entry.lock().await;
    let tracker = account.challenge.as_ref().unwrap();
    assert_eq!(tracker.progress.status, ChallengeStatus::Passed);
    assert_eq!(tracker.get_safety_status(), SafetyStatus::Safe);
    assert!((tracker.progress.total_pnl - 1000.0).abs() < 1e-9);
}

#[tokio::test]
async fn activating_stricter_weights_changes_the_verdict() {
    let feed = Arc::new(ReplayFeed::new(test_time()));
    let harness = build_harness(feed);

    let mut sig = make_signal("sig-1", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
    sig.confidence = 85.0;
    let evaluation = harness.pipeline.evaluate(&sig).await.unwrap();
    assert!(evaluation.passed);

    // A v2 vector with a prohibitive minimum score
    let v2 = ScoringWeights::defaults("v2", 90.0);
    harness.weights.upsert(v2).await.unwrap();
    harness.weights.activate("v2").await.unwrap();

    let mut sig2 = sig.clone();
    sig2.id = "sig-2".to_string();
    sig2.received_at = test_time() + Duration::minutes(5);
    let evaluation = harness.pipeline.evaluate(&sig2).await.unwrap();
    assert!(!evaluation.passed);
    assert_eq!(evaluation.blocked_reason, BlockedReason::Score);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let cfg = test_config();
    let key;
    {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        let store = Arc::new(SentryStore::new(&cfg));
        let weights = Arc::new(WeightsStore::with_defaults("v1", cfg.min_score_threshold));
        let engine = ScoringEngine::new(&cfg, feed.clone(), feed.clone(), store.clone(), weights);
        let pipeline = ValidationPipeline::new(&cfg, engine, store.clone(), feed);

        let mut sig = make_signal("sig-1", "acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        sig.confidence = 85.0;
        key = sig.resolve_idempotency_key();
        pipeline.evaluate(&sig).await.unwrap();
    }

    let reopened = SentryStore::new(&cfg);
    let stored = reopened.evaluation_for(&key).await;
    assert!(stored.is_some(), "evaluation survives a restart");
    assert!(stored.unwrap().passed);

    // Cleanup the temp state dir
    let _ = std::fs::remove_dir_all(&cfg.state_dir);
}
