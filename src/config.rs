use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedConfig = Arc<RwLock<Config>>;

/// Per-account halt thresholds. Accounts start from these defaults; the
/// store keeps a copy per account so they can be tuned individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_consecutive_losers: u32,
    pub max_daily_trades: u32,
    pub max_red_signals_per_day: u32,
    /// true: a halt holds until an explicit reset. false: the halt lifts
    /// automatically once the UTC date moves past the halt date.
    pub halt_until_reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDefaults {
    pub account_size: f64,
    pub max_daily_loss_pct: f64,
    pub max_overall_loss_pct: f64,
    pub min_trading_days: u32,
    pub profit_target_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Feed service (news + price history collaborator)
    pub feed_base_url: String,
    pub feed_api_token: String,
    pub feed_timeout_ms: u64,

    // Scoring lookups
    pub price_window_minutes: i64,
    pub news_window_minutes: i64,
    pub signal_window_hours: i64,

    // News blackout check
    pub news_blackout_minutes: i64,
    pub news_block_sentiment: f64,

    // Risk control
    pub risk: RiskLimits,

    // Funded-account challenge defaults
    pub challenge: ChallengeDefaults,

    // Scoring weights
    pub active_weights_version: String,
    pub min_score_threshold: f64,

    // Persistence & logging
    pub state_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        Config {
            feed_base_url: env("FEED_BASE_URL", "http://localhost:8600"),
            feed_api_token: env("FEED_API_TOKEN", ""),
            feed_timeout_ms: env("FEED_TIMEOUT_MS", "1500").parse().unwrap_or(1500),
            price_window_minutes: env("PRICE_WINDOW_MINUTES", "60").parse().unwrap_or(60),
            news_window_minutes: env("NEWS_WINDOW_MINUTES", "240").parse().unwrap_or(240),
            signal_window_hours: env("SIGNAL_WINDOW_HOURS", "4").parse().unwrap_or(4),
            news_blackout_minutes: env("NEWS_BLACKOUT_MINUTES", "30").parse().unwrap_or(30),
            news_block_sentiment: env("NEWS_BLOCK_SENTIMENT", "0.8").parse().unwrap_or(0.8),
            risk: RiskLimits {
                max_consecutive_losers: env("MAX_CONSECUTIVE_LOSERS", "3").parse().unwrap_or(3),
                max_daily_trades: env("MAX_DAILY_TRADES", "10").parse().unwrap_or(10),
                max_red_signals_per_day: env("MAX_RED_SIGNALS_PER_DAY", "5")
                    .parse()
                    .unwrap_or(5),
                halt_until_reset: env("HALT_UNTIL_RESET", "false").to_lowercase() == "true",
            },
            challenge: ChallengeDefaults {
                account_size: env("CHALLENGE_ACCOUNT_SIZE", "10000").parse().unwrap_or(10000.0),
                max_daily_loss_pct: env("MAX_DAILY_LOSS_PCT", "5").parse().unwrap_or(5.0),
                max_overall_loss_pct: env("MAX_OVERALL_LOSS_PCT", "10").parse().unwrap_or(10.0),
                min_trading_days: env("MIN_TRADING_DAYS", "5").parse().unwrap_or(5),
                profit_target_pct: env("PROFIT_TARGET_PCT", "10").parse().unwrap_or(10.0),
            },
            active_weights_version: env("ACTIVE_WEIGHTS_VERSION", "v1"),
            min_score_threshold: env("MIN_SCORE_THRESHOLD", "60").parse().unwrap_or(60.0),
            state_dir: env("STATE_DIR", "logs"),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}
