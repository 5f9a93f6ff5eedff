use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SentryError;
use crate::models::regime::Regime;
use crate::models::session::Session;

/// Bucket width for the derived idempotency key. Duplicate webhook
/// deliveries land within seconds of each other, so one minute is wide
/// enough to collapse them without swallowing a genuine re-issue.
const IDEMPOTENCY_BUCKET_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An incoming trading signal, immutable once evaluated except for
/// `outcome`, which settlement sets later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub timeframe: Timeframe,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Issuer-stated confidence, 0-100.
    pub confidence: f64,
    pub strategy: String,
    pub regime: Regime,
    #[serde(default)]
    pub session: Option<Session>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl Signal {
    /// Field validation. Malformed signals are rejected here, before the
    /// pipeline runs — no Evaluation is produced for them.
    pub fn validate(&self) -> Result<(), SentryError> {
        if self.id.trim().is_empty() {
            return Err(SentryError::Data("empty signal id".into()));
        }
        if self.account_id.trim().is_empty() {
            return Err(SentryError::Data("empty account id".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(SentryError::Data("empty symbol".into()));
        }
        if self.strategy.trim().is_empty() {
            return Err(SentryError::Data("empty strategy".into()));
        }
        for (name, v) in [
            ("price", self.price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(SentryError::Data(format!("{} must be positive, got {}", name, v)));
            }
        }
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(SentryError::Data(format!(
                "confidence must be within 0-100, got {}",
                self.confidence
            )));
        }
        let (sl_ok, tp_ok) = match self.side {
            Side::Buy => (self.stop_loss < self.price, self.take_profit > self.price),
            Side::Sell => (self.stop_loss > self.price, self.take_profit < self.price),
        };
        if !sl_ok {
            return Err(SentryError::Data(format!(
                "stop_loss {} on wrong side of entry {} for {}",
                self.stop_loss, self.price, self.side
            )));
        }
        if !tp_ok {
            return Err(SentryError::Data(format!(
                "take_profit {} on wrong side of entry {} for {}",
                self.take_profit, self.price, self.side
            )));
        }
        Ok(())
    }

    /// Reward:risk ratio of the stated levels.
    pub fn reward_risk(&self) -> f64 {
        let risk = (self.price - self.stop_loss).abs();
        if risk == 0.0 {
            return 0.0;
        }
        (self.take_profit - self.price).abs() / risk
    }

    /// Client-supplied idempotency token, or one derived from
    /// account + symbol + strategy + a short time bucket. The source
    /// system had no such key; the uniqueness constraint lives here.
    pub fn resolve_idempotency_key(&self) -> String {
        if let Some(key) = &self.idempotency_key {
            if !key.trim().is_empty() {
                return key.clone();
            }
        }
        let bucket = self.received_at.timestamp().div_euclid(IDEMPOTENCY_BUCKET_SECS);
        format!(
            "{}|{}|{}|{}|{}",
            self.account_id, self.symbol, self.strategy, self.side, bucket
        )
    }

    /// Session tag: explicit when supplied, otherwise derived from the
    /// receive timestamp.
    pub fn session_tag(&self) -> Session {
        self.session
            .unwrap_or_else(|| Session::from_timestamp(self.received_at))
    }
}
