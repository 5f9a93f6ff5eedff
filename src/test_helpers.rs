use chrono::{DateTime, Utc};

use crate::config::{ChallengeDefaults, Config, RiskLimits};
use crate::models::{BlockedReason, Evaluation, Regime, Side, Signal, SignalStatus, Timeframe};

/// Fixed evaluation anchor: a Wednesday inside the NY killzone.
pub fn test_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-17T13:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn test_limits() -> RiskLimits {
    RiskLimits {
        max_consecutive_losers: 3,
        max_daily_trades: 10,
        max_red_signals_per_day: 5,
        halt_until_reset: false,
    }
}

/// A Config suitable for testing — no feed service, temp state dir.
pub fn default_test_config() -> Config {
    Config {
        feed_base_url: "http://localhost:0".to_string(),
        feed_api_token: String::new(),
        feed_timeout_ms: 200,
        price_window_minutes: 60,
        news_window_minutes: 240,
        signal_window_hours: 4,
        news_blackout_minutes: 30,
        news_block_sentiment: 0.8,
        risk: test_limits(),
        challenge: ChallengeDefaults {
            account_size: 10000.0,
            max_daily_loss_pct: 5.0,
            max_overall_loss_pct: 10.0,
            min_trading_days: 5,
            profit_target_pct: 10.0,
        },
        active_weights_version: "v1".to_string(),
        min_score_threshold: 60.0,
        state_dir: std::env::temp_dir()
            .join(format!("signal_sentry_test_{}", std::process::id()))
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
    }
}

pub fn make_signal(account: &str, side: Side, entry: f64, sl: f64, tp: f64) -> Signal {
    Signal {
        id: "sig-test-1".to_string(),
        account_id: account.to_string(),
        symbol: "BTC-USD".to_string(),
        side,
        timeframe: Timeframe::M5,
        price: entry,
        stop_loss: sl,
        take_profit: tp,
        confidence: 70.0,
        strategy: "trend_momentum".to_string(),
        regime: Regime::Trending,
        session: None,
        received_at: test_time(),
        outcome: Default::default(),
        idempotency_key: None,
    }
}

pub fn make_evaluation(signal_id: &str) -> Evaluation {
    Evaluation {
        signal_id: signal_id.to_string(),
        account_id: "acct-1".to_string(),
        passed: true,
        blocked_reason: BlockedReason::Passed,
        final_score: 81.25,
        status: SignalStatus::Approved,
        news_ok: true,
        account_ok: true,
        score_ok: true,
        strategy_ok: true,
        degraded: false,
        notes: Vec::new(),
        recommendation: "Surface: truth index 81.25 clears all bands.".to_string(),
        created_at: test_time(),
    }
}
