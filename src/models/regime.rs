use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
    Quiet,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
            Regime::Quiet => "quiet",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyCategory {
    TrendFollowing,
    MeanReversion,
    Breakout,
    Scalp,
    Unknown,
}

impl StrategyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyCategory::TrendFollowing => "trend_following",
            StrategyCategory::MeanReversion => "mean_reversion",
            StrategyCategory::Breakout => "breakout",
            StrategyCategory::Scalp => "scalp",
            StrategyCategory::Unknown => "unknown",
        }
    }

    /// Classify a free-form strategy name by keyword. Signals carry
    /// whatever label the issuing platform uses ("london_breakout",
    /// "EMA trend rider"), so matching stays loose and lowercase.
    pub fn classify(strategy: &str) -> StrategyCategory {
        let s = strategy.to_lowercase();
        if s.contains("breakout") || s.contains("break") {
            StrategyCategory::Breakout
        } else if s.contains("revers") || s.contains("fade") || s.contains("range") {
            StrategyCategory::MeanReversion
        } else if s.contains("scalp") {
            StrategyCategory::Scalp
        } else if s.contains("trend") || s.contains("momentum") || s.contains("swing") {
            StrategyCategory::TrendFollowing
        } else {
            StrategyCategory::Unknown
        }
    }
}

impl fmt::Display for StrategyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
