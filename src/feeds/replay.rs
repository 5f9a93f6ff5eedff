use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::feeds::{MarketFeed, NewsFeed, NewsItem, PerformanceSource, StrategyPerf};

/// Feed implementation that replays pre-loaded data. A cursor (`now`)
/// controls visibility — only entries inside the requested window ending
/// at `now` are returned. Used by tests and offline evaluation runs.
pub struct ReplayFeed {
    news: Mutex<HashMap<String, Vec<NewsItem>>>,
    prices: Mutex<HashMap<String, Vec<(DateTime<Utc>, f64)>>>,
    performance: Mutex<HashMap<String, StrategyPerf>>,
    now: Mutex<DateTime<Utc>>,
}

impl ReplayFeed {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            news: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            performance: Mutex::new(HashMap::new()),
            now: Mutex::new(now),
        }
    }

    pub fn set_time(&self, t: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    pub fn load_news(&self, symbol: &str, items: Vec<NewsItem>) {
        self.news
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), items);
    }

    /// Prices must be sorted oldest-first.
    pub fn load_prices(&self, symbol: &str, prices: Vec<(DateTime<Utc>, f64)>) {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), prices);
    }

    pub fn load_performance(&self, strategy: &str, symbol: &str, perf: StrategyPerf) {
        self.performance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(format!("{}|{}", strategy, symbol), perf);
    }

    fn current_time(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NewsFeed for ReplayFeed {
    async fn recent_news(&self, symbol: &str, window_minutes: i64) -> Result<Vec<NewsItem>> {
        let now = self.current_time();
        let cutoff = now - Duration::minutes(window_minutes);
        let news = self.news.lock().unwrap_or_else(|e| e.into_inner());
        Ok(news
            .get(symbol)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.timestamp > cutoff && i.timestamp <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn recent_prices(&self, symbol: &str, window_minutes: i64) -> Result<Vec<f64>> {
        let now = self.current_time();
        let cutoff = now - Duration::minutes(window_minutes);
        let prices = self.prices.lock().unwrap_or_else(|e| e.into_inner());
        Ok(prices
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|(ts, _)| *ts > cutoff && *ts <= now)
                    .map(|(_, p)| *p)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PerformanceSource for ReplayFeed {
    async fn strategy_performance(&self, strategy: &str, symbol: &str) -> Result<StrategyPerf> {
        let perf = self.performance.lock().unwrap_or_else(|e| e.into_inner());
        Ok(perf
            .get(&format!("{}|{}", strategy, symbol))
            .copied()
            .unwrap_or_default())
    }
}
