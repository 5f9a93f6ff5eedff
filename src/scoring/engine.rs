use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::feeds::{MarketFeed, NewsFeed, NewsItem, PerformanceSource};
use crate::models::{Regime, Side, Signal, SignalStatus, StrategyCategory};
use crate::scoring::weights::{ScoringWeights, WeightsStore};

const MIN_PRICE_OBSERVATIONS: usize = 5;
const MIN_PERFORMANCE_SAMPLE: u32 = 10;

// Documented neutral fallbacks, one per lookup-backed factor
const NEUTRAL_VOLATILITY: f64 = 0.70;
const NEUTRAL_SENTIMENT: f64 = 0.75;
const NEUTRAL_RELIABILITY: f64 = 0.70;

/// Outcome of one factor computation. Degraded carries the same numeric
/// band as a clean score but tells the caller the value is a fallback,
/// not a measurement.
#[derive(Debug, Clone)]
pub enum FactorScore {
    Clean(f64),
    Degraded(f64, String),
}

impl FactorScore {
    pub fn value(&self) -> f64 {
        match self {
            FactorScore::Clean(v) | FactorScore::Degraded(v, _) => *v,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            FactorScore::Clean(_) => None,
            FactorScore::Degraded(_, note) => Some(note),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorBreakdown {
    pub name: &'static str,
    pub value: f64,
    pub weight: f64,
    pub weighted: f64,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-account context the engine cannot look up itself; the pipeline
/// reads it under the account lock and hands it over.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountSnapshot {
    /// Signals seen for the account in the trailing frequency window.
    pub signals_last_window: usize,
    pub is_halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub truth_index: f64,
    pub status: SignalStatus,
    pub factors: Vec<FactorBreakdown>,
    pub notes: Vec<String>,
    pub degraded: bool,
    pub recommendation: String,
    pub weights_version: String,
    pub min_score_threshold: f64,
}

pub struct ScoringEngine {
    news: Arc<dyn NewsFeed>,
    market: Arc<dyn MarketFeed>,
    performance: Arc<dyn PerformanceSource>,
    weights: Arc<WeightsStore>,
    price_window_minutes: i64,
    news_window_minutes: i64,
    lookup_timeout: Duration,
    fallback_version: String,
    fallback_threshold: f64,
}

impl ScoringEngine {
    pub fn new(
        cfg: &Config,
        news: Arc<dyn NewsFeed>,
        market: Arc<dyn MarketFeed>,
        performance: Arc<dyn PerformanceSource>,
        weights: Arc<WeightsStore>,
    ) -> Self {
        Self {
            news,
            market,
            performance,
            weights,
            price_window_minutes: cfg.price_window_minutes,
            news_window_minutes: cfg.news_window_minutes,
            lookup_timeout: Duration::from_millis(cfg.feed_timeout_ms),
            fallback_version: cfg.active_weights_version.clone(),
            fallback_threshold: cfg.min_score_threshold,
        }
    }

    /// Compute the truth index for one signal. Never fails: every lookup
    /// is bounded and falls open to its neutral band on error or timeout.
    pub async fn score(&self, signal: &Signal, account: &AccountSnapshot) -> ScoreReport {
        let (weights, mut notes) = match self.weights.active().await {
            Some(w) => (w, Vec::new()),
            None => (
                ScoringWeights::defaults(&self.fallback_version, self.fallback_threshold),
                vec!["no active weights version; using built-in defaults".to_string()],
            ),
        };

        let technical = technical_integrity(signal.reward_risk(), signal.confidence);
        let volatility = self.volatility_filter(signal).await;
        let regime = regime_alignment(signal.regime, StrategyCategory::classify(&signal.strategy));
        let sentiment = self.sentiment_coherence(signal).await;
        let historical = self.historical_reliability(signal).await;
        let psychological = psychological_safety(account.signals_last_window, account.is_halted);

        let factors = vec![
            breakdown("technical_integrity", &technical, weights.technical),
            breakdown("volatility_filter", &volatility, weights.volatility),
            breakdown("regime_alignment", &regime, weights.regime),
            breakdown("sentiment_coherence", &sentiment, weights.sentiment),
            breakdown("historical_reliability", &historical, weights.historical),
            breakdown("psychological_safety", &psychological, weights.psychological),
        ];

        for f in &factors {
            if let Some(note) = &f.note {
                notes.push(format!("{}: {}", f.name, note));
            }
        }

        let raw: f64 = factors.iter().map(|f| f.weighted).sum();
        let truth_index = round2((raw * 100.0).clamp(0.0, 100.0));
        let status = SignalStatus::from_score(truth_index);
        let degraded = factors.iter().any(|f| f.degraded);
        let recommendation = recommend(status, truth_index, &factors);

        debug!(
            signal_id = %signal.id,
            truth_index,
            status = %status,
            degraded,
            "signal scored"
        );

        ScoreReport {
            truth_index,
            status,
            factors,
            notes,
            degraded,
            recommendation,
            weights_version: weights.version.clone(),
            min_score_threshold: weights.min_score_threshold,
        }
    }

    async fn volatility_filter(&self, signal: &Signal) -> FactorScore {
        let prices = match self
            .bounded(self.market.recent_prices(&signal.symbol, self.price_window_minutes))
            .await
        {
            Ok(p) => p,
            Err(e) => {
                return FactorScore::Degraded(
                    NEUTRAL_VOLATILITY,
                    format!("price lookup failed ({}); neutral applied", e),
                )
            }
        };

        if prices.len() < MIN_PRICE_OBSERVATIONS {
            return FactorScore::Degraded(
                NEUTRAL_VOLATILITY,
                format!("only {} recent prices; neutral applied", prices.len()),
            );
        }

        let cv = coefficient_of_variation(&prices);
        FactorScore::Clean(volatility_band(cv))
    }

    async fn sentiment_coherence(&self, signal: &Signal) -> FactorScore {
        let items = match self
            .bounded(self.news.recent_news(&signal.symbol, self.news_window_minutes))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                return FactorScore::Degraded(
                    NEUTRAL_SENTIMENT,
                    format!("news lookup failed ({}); neutral applied", e),
                )
            }
        };

        if items.is_empty() {
            return FactorScore::Degraded(
                NEUTRAL_SENTIMENT,
                "no recent news; neutral applied".to_string(),
            );
        }

        FactorScore::Clean(sentiment_band(signed_sentiment(&items, signal.side)))
    }

    async fn historical_reliability(&self, signal: &Signal) -> FactorScore {
        let perf = match self
            .bounded(
                self.performance
                    .strategy_performance(&signal.strategy, &signal.symbol),
            )
            .await
        {
            Ok(p) => p,
            Err(e) => {
                return FactorScore::Degraded(
                    NEUTRAL_RELIABILITY,
                    format!("performance lookup failed ({}); neutral applied", e),
                )
            }
        };

        if perf.total < MIN_PERFORMANCE_SAMPLE {
            return FactorScore::Degraded(
                NEUTRAL_RELIABILITY,
                format!("only {} settled trades for strategy; neutral applied", perf.total),
            );
        }

        FactorScore::Clean(reliability_band(perf.win_rate()))
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(res) => res,
            Err(_) => anyhow::bail!("timed out after {:?}", self.lookup_timeout),
        }
    }
}

fn breakdown(name: &'static str, score: &FactorScore, weight: f64) -> FactorBreakdown {
    let value = score.value().clamp(0.0, 1.0);
    FactorBreakdown {
        name,
        value,
        weight,
        weighted: value * weight,
        degraded: score.note().is_some(),
        note: score.note().map(|s| s.to_string()),
    }
}

/// Reward:risk band blended with issuer-stated confidence.
fn technical_integrity(reward_risk: f64, confidence: f64) -> FactorScore {
    let ratio_score = if reward_risk >= 3.0 {
        1.0
    } else if reward_risk >= 2.0 {
        0.9
    } else if reward_risk >= 1.5 {
        0.75
    } else if reward_risk >= 1.0 {
        0.6
    } else {
        0.35
    };
    let conf_score = (confidence / 100.0).clamp(0.0, 1.0);
    FactorScore::Clean((0.6 * ratio_score + 0.4 * conf_score).clamp(0.0, 1.0))
}

fn coefficient_of_variation(prices: &[f64]) -> f64 {
    let n = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean.abs()
}

fn volatility_band(cv: f64) -> f64 {
    if cv < 0.005 {
        0.95
    } else if cv < 0.01 {
        0.85
    } else if cv < 0.02 {
        0.70
    } else if cv < 0.04 {
        0.50
    } else {
        0.30
    }
}

fn regime_alignment(regime: Regime, category: StrategyCategory) -> FactorScore {
    use Regime::*;
    use StrategyCategory::*;
    let score = match (regime, category) {
        (Trending, TrendFollowing) => 0.90,
        (Trending, Breakout) => 0.75,
        (Trending, Scalp) => 0.60,
        (Trending, MeanReversion) => 0.40,
        (Ranging, MeanReversion) => 0.90,
        (Ranging, Scalp) => 0.70,
        (Ranging, TrendFollowing) => 0.45,
        (Ranging, Breakout) => 0.30,
        (Volatile, Breakout) => 0.85,
        (Volatile, TrendFollowing) => 0.55,
        (Volatile, Scalp) => 0.50,
        (Volatile, MeanReversion) => 0.35,
        (Quiet, Scalp) => 0.75,
        (Quiet, MeanReversion) => 0.70,
        (Quiet, TrendFollowing) => 0.50,
        (Quiet, Breakout) => 0.40,
        (_, Unknown) => 0.60,
    };
    FactorScore::Clean(score)
}

/// Mean sentiment signed by trade side: positive means the news agrees
/// with the direction of the trade.
fn signed_sentiment(items: &[NewsItem], side: Side) -> f64 {
    let mean = items.iter().map(|i| i.sentiment).sum::<f64>() / items.len() as f64;
    match side {
        Side::Buy => mean,
        Side::Sell => -mean,
    }
}

fn sentiment_band(signed: f64) -> f64 {
    if signed >= 0.3 {
        0.90
    } else if signed > 0.05 {
        0.80
    } else if signed >= -0.05 {
        0.70
    } else if signed > -0.3 {
        0.45
    } else {
        0.25
    }
}

fn reliability_band(win_rate: f64) -> f64 {
    if win_rate >= 0.65 {
        0.95
    } else if win_rate < 0.45 {
        0.40
    } else {
        // Linear between the 45% floor and the 65% ceiling
        0.40 + (win_rate - 0.45) / 0.20 * 0.55
    }
}

fn psychological_safety(signals_last_window: usize, is_halted: bool) -> FactorScore {
    let base = if signals_last_window > 10 {
        0.5
    } else if signals_last_window > 5 {
        0.7
    } else {
        0.9
    };
    if is_halted {
        FactorScore::Degraded(base / 2.0, "account is halted; score halved".to_string())
    } else {
        FactorScore::Clean(base)
    }
}

fn recommend(status: SignalStatus, truth_index: f64, factors: &[FactorBreakdown]) -> String {
    let weakest = factors
        .iter()
        .min_by(|a, b| a.value.total_cmp(&b.value))
        .map(|f| f.name)
        .unwrap_or("technical_integrity");

    match status {
        SignalStatus::Approved => format!("Surface: truth index {:.2} clears all bands.", truth_index),
        SignalStatus::Conditional => format!(
            "Surface with caution: truth index {:.2}; weakest factor is {}.",
            truth_index, weakest
        ),
        SignalStatus::Rejected => format!(
            "Do not surface: truth index {:.2}; weakest factor is {}.",
            truth_index, weakest
        ),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{ReplayFeed, StrategyPerf};
    use crate::test_helpers::{default_test_config, make_signal, test_time};
    use chrono::Duration as ChronoDuration;

    fn engine_with(feed: Arc<ReplayFeed>) -> ScoringEngine {
        let cfg = default_test_config();
        let weights = Arc::new(WeightsStore::with_defaults("v1", cfg.min_score_threshold));
        ScoringEngine::new(&cfg, feed.clone(), feed.clone(), feed, weights)
    }

    fn neutral_engine() -> ScoringEngine {
        engine_with(Arc::new(ReplayFeed::new(test_time())))
    }

    #[tokio::test]
    async fn strong_signal_with_neutral_context_is_approved() {
        // confidence 85, reward:risk exactly 2:1, no contextual data
        let mut sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        sig.confidence = 85.0;

        let report = neutral_engine().score(&sig, &AccountSnapshot::default()).await;
        assert!(report.truth_index >= 80.0, "got {}", report.truth_index);
        assert_eq!(report.status, SignalStatus::Approved);
        // The three lookup-backed factors all fell back to neutral
        assert!(report.degraded);
    }

    #[tokio::test]
    async fn truth_index_stays_in_range() {
        let mut sig = make_signal("acct-1", Side::Buy, 50000.0, 49999.0, 50001.0);
        sig.confidence = 0.0;
        sig.regime = Regime::Ranging;
        sig.strategy = "london_breakout".to_string();
        let report = neutral_engine().score(&sig, &AccountSnapshot::default()).await;
        assert!((0.0..=100.0).contains(&report.truth_index));
    }

    #[tokio::test]
    async fn scoring_is_deterministic() {
        let sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        let engine = neutral_engine();
        let snapshot = AccountSnapshot::default();
        let a = engine.score(&sig, &snapshot).await;
        let b = engine.score(&sig, &snapshot).await;
        assert_eq!(a.truth_index, b.truth_index);
        assert_eq!(a.status, b.status);
    }

    #[tokio::test]
    async fn conflicting_news_drags_sentiment_down() {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        feed.load_news(
            "BTC-USD",
            vec![
                NewsItem {
                    sentiment: -0.8,
                    timestamp: test_time() - ChronoDuration::minutes(10),
                    currency: "USD".to_string(),
                },
                NewsItem {
                    sentiment: -0.6,
                    timestamp: test_time() - ChronoDuration::minutes(20),
                    currency: "USD".to_string(),
                },
            ],
        );
        let engine = engine_with(feed);

        let sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let sentiment = report
            .factors
            .iter()
            .find(|f| f.name == "sentiment_coherence")
            .unwrap();
        assert!(sentiment.value <= 0.25);
        assert!(!sentiment.degraded);
    }

    #[tokio::test]
    async fn aligned_news_for_sell_side() {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        feed.load_news(
            "BTC-USD",
            vec![NewsItem {
                sentiment: -0.7,
                timestamp: test_time() - ChronoDuration::minutes(5),
                currency: "USD".to_string(),
            }],
        );
        let engine = engine_with(feed);

        let sig = make_signal("acct-1", Side::Sell, 50000.0, 50500.0, 49000.0);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let sentiment = report
            .factors
            .iter()
            .find(|f| f.name == "sentiment_coherence")
            .unwrap();
        assert!((sentiment.value - 0.90).abs() < 1e-9);
    }

    #[tokio::test]
    async fn calm_prices_score_high_choppy_prices_low() {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        let calm: Vec<_> = (0..20)
            .map(|i| {
                (
                    test_time() - ChronoDuration::minutes(20 - i),
                    50000.0 + i as f64,
                )
            })
            .collect();
        feed.load_prices("BTC-USD", calm);
        let engine = engine_with(feed.clone());
        let sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let vol = report
            .factors
            .iter()
            .find(|f| f.name == "volatility_filter")
            .unwrap();
        assert!((vol.value - 0.95).abs() < 1e-9);

        let choppy: Vec<_> = (0..20)
            .map(|i| {
                let p = if i % 2 == 0 { 45000.0 } else { 55000.0 };
                (test_time() - ChronoDuration::minutes(20 - i), p)
            })
            .collect();
        feed.load_prices("BTC-USD", choppy);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let vol = report
            .factors
            .iter()
            .find(|f| f.name == "volatility_filter")
            .unwrap();
        assert!((vol.value - 0.30).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sparse_price_history_is_neutral() {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        feed.load_prices(
            "BTC-USD",
            vec![
                (test_time() - ChronoDuration::minutes(3), 50000.0),
                (test_time() - ChronoDuration::minutes(2), 50010.0),
            ],
        );
        let engine = engine_with(feed);
        let sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let vol = report
            .factors
            .iter()
            .find(|f| f.name == "volatility_filter")
            .unwrap();
        assert!((vol.value - NEUTRAL_VOLATILITY).abs() < 1e-9);
        assert!(vol.degraded);
    }

    #[tokio::test]
    async fn historical_reliability_scales_with_win_rate() {
        let feed = Arc::new(ReplayFeed::new(test_time()));
        feed.load_performance("trend_momentum", "BTC-USD", StrategyPerf { wins: 13, total: 20 });
        let engine = engine_with(feed);
        let sig = make_signal("acct-1", Side::Buy, 50000.0, 49500.0, 51000.0);
        let report = engine.score(&sig, &AccountSnapshot::default()).await;
        let hist = report
            .factors
            .iter()
            .find(|f| f.name == "historical_reliability")
            .unwrap();
        // 65% win rate lands on the 0.95 ceiling
        assert!((hist.value - 0.95).abs() < 1e-9);
        assert!(!hist.degraded);
    }

    #[test]
    fn reliability_band_edges() {
        assert!((reliability_band(0.40) - 0.40).abs() < 1e-9);
        assert!((reliability_band(0.449) - 0.40).abs() < 1e-9);
        assert!((reliability_band(0.45) - 0.40).abs() < 1e-9);
        assert!((reliability_band(0.55) - 0.675).abs() < 1e-9);
        assert!((reliability_band(0.65) - 0.95).abs() < 1e-9);
        assert!((reliability_band(0.90) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn psychological_bands() {
        assert!((psychological_safety(0, false).value() - 0.9).abs() < 1e-9);
        assert!((psychological_safety(5, false).value() - 0.9).abs() < 1e-9);
        assert!((psychological_safety(8, false).value() - 0.7).abs() < 1e-9);
        assert!((psychological_safety(12, false).value() - 0.5).abs() < 1e-9);
        // Halted accounts are halved: 8 trailing signals drops to 0.35
        let halted = psychological_safety(8, true);
        assert!(halted.value() <= 0.5);
        assert!(halted.note().is_some());
    }

    #[test]
    fn technical_band_rewards_high_ratio() {
        assert!(technical_integrity(2.0, 85.0).value() > technical_integrity(0.8, 85.0).value());
        // Sub-1.0 reward:risk lands in the penalty band
        assert!((technical_integrity(0.8, 50.0).value() - (0.6 * 0.35 + 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn regime_table_extremes() {
        assert!(
            regime_alignment(Regime::Trending, StrategyCategory::TrendFollowing).value() >= 0.9
        );
        assert!((regime_alignment(Regime::Ranging, StrategyCategory::Breakout).value() - 0.3).abs() < 1e-9);
    }
}
