use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::feeds::{MarketFeed, NewsFeed, NewsItem};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct NewsResponse {
    items: Vec<RawNewsItem>,
}

#[derive(Debug, Deserialize)]
struct RawNewsItem {
    sentiment: f64,
    timestamp: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    prices: Vec<f64>,
}

/// HTTP client for the news/price feed service. Rate limited and cached
/// with a short TTL so the scoring pass and the blackout check within one
/// evaluation hit the wire at most once per endpoint.
pub struct FeedClient {
    client: Client,
    base_url: String,
    api_token: String,
    last_request: Mutex<Option<Instant>>,
    news_cache: Mutex<HashMap<String, (Instant, Vec<NewsItem>)>>,
    price_cache: Mutex<HashMap<String, (Instant, Vec<f64>)>>,
}

impl FeedClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.feed_timeout_ms))
            .build()
            .context("Failed to build feed HTTP client")?;

        Ok(Self {
            client,
            base_url: cfg.feed_base_url.trim_end_matches('/').to_string(),
            api_token: cfg.feed_api_token.clone(),
            last_request: Mutex::new(None),
            news_cache: Mutex::new(HashMap::new()),
            price_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn rate_limit(&self) {
        let wait = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            last.and_then(|t| MIN_REQUEST_INTERVAL.checked_sub(t.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.rate_limit().await;

        let mut req = self.client.get(format!("{}{}", self.base_url, path)).query(query);
        if !self.api_token.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_token));
        }

        let resp = req.send().await.context("Feed request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Feed service error {}: {}", status, body);
        }

        resp.json::<T>().await.context("Failed to parse feed response")
    }
}

#[async_trait]
impl NewsFeed for FeedClient {
    async fn recent_news(&self, symbol: &str, window_minutes: i64) -> Result<Vec<NewsItem>> {
        let cache_key = format!("{}_{}", symbol, window_minutes);
        {
            let cache = self.news_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((cached_at, items)) = cache.get(&cache_key) {
                if cached_at.elapsed() < CACHE_TTL {
                    return Ok(items.clone());
                }
            }
        }

        let data: NewsResponse = self
            .get_json(
                "/v1/news",
                &[
                    ("symbol", symbol.to_string()),
                    ("minutes", window_minutes.to_string()),
                ],
            )
            .await?;

        let items: Vec<NewsItem> = data
            .items
            .into_iter()
            .filter_map(|raw| {
                let timestamp = DateTime::from_timestamp(raw.timestamp, 0)?;
                Some(NewsItem {
                    sentiment: raw.sentiment.clamp(-1.0, 1.0),
                    timestamp,
                    currency: raw.currency,
                })
            })
            .collect();

        self.news_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, (Instant::now(), items.clone()));

        Ok(items)
    }
}

#[async_trait]
impl MarketFeed for FeedClient {
    async fn recent_prices(&self, symbol: &str, window_minutes: i64) -> Result<Vec<f64>> {
        let cache_key = format!("{}_{}", symbol, window_minutes);
        {
            let cache = self.price_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((cached_at, prices)) = cache.get(&cache_key) {
                if cached_at.elapsed() < CACHE_TTL {
                    return Ok(prices.clone());
                }
            }
        }

        let data: PriceResponse = self
            .get_json(
                "/v1/prices",
                &[
                    ("symbol", symbol.to_string()),
                    ("minutes", window_minutes.to_string()),
                ],
            )
            .await?;

        let prices: Vec<f64> = data.prices.into_iter().filter(|p| p.is_finite() && *p > 0.0).collect();

        self.price_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, (Instant::now(), prices.clone()));

        Ok(prices)
    }
}
