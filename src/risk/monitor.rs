use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RiskLimits;
use crate::models::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaltKind {
    Auto,
    Manual,
}

/// Mutable halt state for one account. Invariant: `is_halted` implies
/// `halt_triggered_at` is set and `halt_reason` is non-empty — `halt`
/// and `clear` are the only mutation paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskState {
    pub is_halted: bool,
    #[serde(default)]
    pub halt_reason: String,
    #[serde(default)]
    pub halt_kind: Option<HaltKind>,
    #[serde(default)]
    pub halt_triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reset_at: Option<DateTime<Utc>>,
    /// UTC date ("%Y-%m-%d") the daily counters belong to.
    #[serde(default)]
    pub counter_date: String,
    #[serde(default)]
    pub signals_today: u32,
    #[serde(default)]
    pub red_today: u32,
}

/// Consecutive settled losses walking back from the most recent settled
/// outcome, stopping at the first win. Pending outcomes are skipped.
pub fn consecutive_losses(outcomes: &[Outcome]) -> u32 {
    let mut streak = 0;
    for outcome in outcomes.iter().rev() {
        match outcome {
            Outcome::Pending => continue,
            Outcome::Loss => streak += 1,
            Outcome::Win => break,
        }
    }
    streak
}

/// Per-account Active/Halted state machine driven by daily counters and
/// loss streaks.
pub struct RiskControlMonitor {
    pub limits: RiskLimits,
}

impl RiskControlMonitor {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// Lazily roll the daily counter window and lift expired halts. Safe
    /// to call any number of times.
    pub fn touch(&self, state: &mut RiskState, now: DateTime<Utc>) {
        let today = now.format("%Y-%m-%d").to_string();
        if state.counter_date != today {
            state.counter_date = today;
            state.signals_today = 0;
            state.red_today = 0;
        }

        // Auto-resume once the UTC date is strictly past the halt date
        if state.is_halted && !self.limits.halt_until_reset {
            if let Some(at) = state.halt_triggered_at {
                if now.date_naive() > at.date_naive() {
                    info!("halt expired at day boundary, resuming account");
                    Self::clear(state, now);
                }
            }
        }
    }

    pub fn is_halted(&self, state: &mut RiskState, now: DateTime<Utc>) -> bool {
        self.touch(state, now);
        state.is_halted
    }

    pub fn record_signal(&self, state: &mut RiskState, red: bool, now: DateTime<Utc>) {
        self.touch(state, now);
        state.signals_today += 1;
        if red {
            state.red_today += 1;
        }
    }

    /// Evaluate Active -> Halted. Violations are checked in a fixed
    /// order: daily trade count, red-signal count, loss streak; the
    /// first one encountered wins. No-op when already halted.
    pub fn evaluate(&self, state: &mut RiskState, outcomes: &[Outcome], now: DateTime<Utc>) {
        self.touch(state, now);
        if state.is_halted {
            return;
        }

        if state.signals_today >= self.limits.max_daily_trades {
            let reason = format!(
                "Daily trade limit reached ({}/{})",
                state.signals_today, self.limits.max_daily_trades
            );
            self.halt(state, HaltKind::Auto, reason, now);
            return;
        }

        if state.red_today >= self.limits.max_red_signals_per_day {
            let reason = format!(
                "Red signal limit reached ({}/{})",
                state.red_today, self.limits.max_red_signals_per_day
            );
            self.halt(state, HaltKind::Auto, reason, now);
            return;
        }

        let streak = consecutive_losses(outcomes);
        if streak >= self.limits.max_consecutive_losers {
            let reason = format!(
                "Consecutive loss limit reached ({}/{})",
                streak, self.limits.max_consecutive_losers
            );
            self.halt(state, HaltKind::Auto, reason, now);
        }
    }

    pub fn halt_manual(&self, state: &mut RiskState, reason: &str, now: DateTime<Utc>) {
        let reason = if reason.trim().is_empty() {
            "Manually halted".to_string()
        } else {
            reason.to_string()
        };
        self.halt(state, HaltKind::Manual, reason, now);
    }

    /// Explicit reset: lifts the halt and zeroes the daily counters.
    pub fn reset(&self, state: &mut RiskState, now: DateTime<Utc>) {
        Self::clear(state, now);
        state.counter_date = now.format("%Y-%m-%d").to_string();
        state.signals_today = 0;
        state.red_today = 0;
        info!("risk state manually reset");
    }

    fn halt(&self, state: &mut RiskState, kind: HaltKind, reason: String, now: DateTime<Utc>) {
        if state.is_halted {
            return;
        }
        info!(reason = %reason, kind = ?kind, "account halted");
        state.is_halted = true;
        state.halt_reason = reason;
        state.halt_kind = Some(kind);
        state.halt_triggered_at = Some(now);
    }

    fn clear(state: &mut RiskState, now: DateTime<Utc>) {
        state.is_halted = false;
        state.halt_reason.clear();
        state.halt_kind = None;
        state.halt_triggered_at = None;
        state.last_reset_at = Some(now);
    }
}
