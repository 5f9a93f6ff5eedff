use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

use crate::config::ChallengeDefaults;

/// Fraction of a loss limit consumed before the account counts as at
/// risk.
const AT_RISK_BAND: f64 = 0.60;

/// Immutable per-activation thresholds. Percentages are whole numbers
/// (5 means 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    pub account_size: f64,
    pub max_daily_loss_pct: f64,
    pub max_overall_loss_pct: f64,
    pub min_trading_days: u32,
    pub profit_target_pct: f64,
}

impl ChallengeConfig {
    pub fn from_defaults(defaults: &ChallengeDefaults) -> Self {
        Self {
            account_size: defaults.account_size,
            max_daily_loss_pct: defaults.max_daily_loss_pct,
            max_overall_loss_pct: defaults.max_overall_loss_pct,
            min_trading_days: defaults.min_trading_days,
            profit_target_pct: defaults.profit_target_pct,
        }
    }

    fn daily_loss_limit(&self) -> f64 {
        self.account_size * self.max_daily_loss_pct / 100.0
    }

    fn overall_loss_limit(&self) -> f64 {
        self.account_size * self.max_overall_loss_pct / 100.0
    }

    fn profit_target(&self) -> f64 {
        self.account_size * self.profit_target_pct / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    #[default]
    Active,
    Passed,
    Failed,
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Passed => "passed",
            ChallengeStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    Safe,
    AtRisk,
    Breach,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub daily_pnl: f64,
    /// UTC date ("%Y-%m-%d") the daily pnl belongs to.
    pub daily_date: String,
    pub total_pnl: f64,
    pub peak_balance: f64,
    pub trading_days: BTreeSet<String>,
    pub daily_violations: u32,
    pub overall_violations: u32,
    pub status: ChallengeStatus,
}

/// Drawdown/profit-target tracker for one funded-account challenge.
/// Settlement events mutate progress until a terminal state is reached;
/// passed/failed challenges ignore further updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeTracker {
    pub config: ChallengeConfig,
    pub progress: ChallengeProgress,
}

impl ChallengeTracker {
    pub fn new(config: ChallengeConfig) -> Self {
        let progress = ChallengeProgress {
            peak_balance: config.account_size,
            ..Default::default()
        };
        Self { config, progress }
    }

    pub fn is_terminal(&self) -> bool {
        self.progress.status != ChallengeStatus::Active
    }

    /// Apply one settled trade. Rolls the daily window on a date change,
    /// updates pnl and peak balance, then evaluates violations and the
    /// pass condition.
    pub fn record_settlement(&mut self, pnl: f64, date: NaiveDate) {
        if self.is_terminal() {
            warn!(
                status = %self.progress.status,
                "settlement ignored: challenge already terminal"
            );
            return;
        }

        let date_key = date.format("%Y-%m-%d").to_string();
        if self.progress.daily_date != date_key {
            self.progress.daily_date = date_key.clone();
            self.progress.daily_pnl = 0.0;
        }

        self.progress.daily_pnl += pnl;
        self.progress.total_pnl += pnl;
        self.progress.trading_days.insert(date_key);

        let balance = self.config.account_size + self.progress.total_pnl;
        if balance > self.progress.peak_balance {
            self.progress.peak_balance = balance;
        }

        if !self.check_daily_loss_limit() {
            self.progress.daily_violations += 1;
            self.progress.status = ChallengeStatus::Failed;
            info!(
                daily_pnl = self.progress.daily_pnl,
                "challenge failed: daily loss limit breached"
            );
            return;
        }

        if !self.check_overall_loss_limit() {
            self.progress.overall_violations += 1;
            self.progress.status = ChallengeStatus::Failed;
            info!(
                total_pnl = self.progress.total_pnl,
                "challenge failed: overall loss limit breached"
            );
            return;
        }

        if self.check_challenge_passed() {
            self.progress.status = ChallengeStatus::Passed;
            info!(total_pnl = self.progress.total_pnl, "challenge passed");
        }
    }

    /// True while the daily loss stays inside the limit. Only a negative
    /// daily pnl can breach.
    pub fn check_daily_loss_limit(&self) -> bool {
        if self.progress.daily_pnl >= 0.0 {
            return true;
        }
        self.progress.daily_pnl.abs() < self.config.daily_loss_limit()
    }

    /// True while drawdown from the peak balance stays inside the overall
    /// limit.
    pub fn check_overall_loss_limit(&self) -> bool {
        self.drawdown() < self.config.overall_loss_limit()
    }

    pub fn check_challenge_passed(&self) -> bool {
        self.progress.total_pnl >= self.config.profit_target()
            && self.progress.trading_days.len() >= self.config.min_trading_days as usize
            && self.progress.daily_violations == 0
            && self.progress.overall_violations == 0
    }

    /// Three-band status from the worse of the two loss limits. Purely
    /// derived, no side effects.
    pub fn get_safety_status(&self) -> SafetyStatus {
        let used = self.daily_loss_used().max(self.overall_loss_used());
        if used >= 1.0 {
            SafetyStatus::Breach
        } else if used >= AT_RISK_BAND {
            SafetyStatus::AtRisk
        } else {
            SafetyStatus::Safe
        }
    }

    /// Day-boundary trigger: zeroes the daily pnl only.
    pub fn reset_daily_pnl(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.progress.daily_pnl = 0.0;
    }

    fn drawdown(&self) -> f64 {
        let balance = self.config.account_size + self.progress.total_pnl;
        (self.progress.peak_balance - balance).max(0.0)
    }

    fn daily_loss_used(&self) -> f64 {
        if self.progress.daily_pnl >= 0.0 {
            return 0.0;
        }
        self.progress.daily_pnl.abs() / self.config.daily_loss_limit()
    }

    fn overall_loss_used(&self) -> f64 {
        self.drawdown() / self.config.overall_loss_limit()
    }
}
