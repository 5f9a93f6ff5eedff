use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated cause recorded on an Evaluation when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    Passed,
    News,
    AccountRule,
    Score,
    Strategy,
    Multiple,
    Manual,
}

impl BlockedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedReason::Passed => "passed",
            BlockedReason::News => "news",
            BlockedReason::AccountRule => "account_rule",
            BlockedReason::Score => "score",
            BlockedReason::Strategy => "strategy",
            BlockedReason::Multiple => "multiple",
            BlockedReason::Manual => "manual",
        }
    }
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Approved,
    Conditional,
    Rejected,
}

impl SignalStatus {
    /// Boundary-exact banding of the truth index.
    pub fn from_score(truth_index: f64) -> SignalStatus {
        if truth_index >= 80.0 {
            SignalStatus::Approved
        } else if truth_index >= 60.0 {
            SignalStatus::Conditional
        } else {
            SignalStatus::Rejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Approved => "approved",
            SignalStatus::Conditional => "conditional",
            SignalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The pipeline's verdict for one signal. One-to-one with Signal,
/// persisted in a single store insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub signal_id: String,
    pub account_id: String,
    pub passed: bool,
    pub blocked_reason: BlockedReason,
    pub final_score: f64,
    pub status: SignalStatus,
    pub news_ok: bool,
    pub account_ok: bool,
    pub score_ok: bool,
    pub strategy_ok: bool,
    /// True when any scoring factor fell back to its neutral default.
    pub degraded: bool,
    pub notes: Vec<String>,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
}
