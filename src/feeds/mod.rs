pub mod http;
pub mod replay;

pub use http::FeedClient;
pub use replay::ReplayFeed;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Sentiment in [-1, 1]; positive is bullish for the symbol.
    pub sentiment: f64,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyPerf {
    pub wins: u32,
    pub total: u32,
}

impl StrategyPerf {
    pub fn win_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.wins as f64 / self.total as f64
    }
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn recent_news(&self, symbol: &str, window_minutes: i64) -> Result<Vec<NewsItem>>;
}

#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn recent_prices(&self, symbol: &str, window_minutes: i64) -> Result<Vec<f64>>;
}

#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn strategy_performance(&self, strategy: &str, symbol: &str) -> Result<StrategyPerf>;
}
