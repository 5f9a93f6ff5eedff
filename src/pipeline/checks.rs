use anyhow::Result;
use chrono::Duration;

use crate::feeds::NewsItem;
use crate::models::{BlockedReason, Regime, Signal, StrategyCategory};
use crate::scoring::ScoreReport;

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub reason: String,
    pub score: Option<f64>,
}

impl CheckResult {
    fn pass(reason: &str) -> Self {
        Self {
            passed: true,
            reason: reason.to_string(),
            score: None,
        }
    }

    fn fail(reason: String) -> Self {
        Self {
            passed: false,
            reason,
            score: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckParams {
    pub news_blackout_minutes: i64,
    pub news_block_sentiment: f64,
}

/// Everything a check is allowed to look at. Built once per evaluation
/// under the account lock.
pub struct CheckContext<'a> {
    pub signal: &'a Signal,
    pub report: &'a ScoreReport,
    pub halted: bool,
    pub halt_reason: &'a str,
    pub manual_halt: bool,
    pub challenge_breach: bool,
    pub allowed_strategies: &'a [String],
    /// None means the lookup failed; the check fails open.
    pub news: Option<&'a [NewsItem]>,
    pub params: &'a CheckParams,
}

/// The fixed check set. The pipeline iterates `ORDER`; order affects
/// which name is reported first, never the pass/fail outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    News,
    AccountRule,
    Score,
    StrategyMatch,
}

impl Check {
    pub const ORDER: [Check; 4] = [
        Check::News,
        Check::AccountRule,
        Check::Score,
        Check::StrategyMatch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Check::News => "news",
            Check::AccountRule => "account_rule",
            Check::Score => "score",
            Check::StrategyMatch => "strategy_match",
        }
    }

    pub fn blocked_reason(&self) -> BlockedReason {
        match self {
            Check::News => BlockedReason::News,
            Check::AccountRule => BlockedReason::AccountRule,
            Check::Score => BlockedReason::Score,
            Check::StrategyMatch => BlockedReason::Strategy,
        }
    }

    pub fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        match self {
            Check::News => Ok(news_check(ctx)),
            Check::AccountRule => Ok(account_rule_check(ctx)),
            Check::Score => Ok(score_check(ctx)),
            Check::StrategyMatch => Ok(strategy_match_check(ctx)),
        }
    }
}

/// Blocks signals landing inside the blackout window of a high-impact
/// item (|sentiment| used as the impact proxy).
fn news_check(ctx: &CheckContext<'_>) -> CheckResult {
    let Some(items) = ctx.news else {
        return CheckResult::pass("news lookup unavailable; fail-open pass");
    };

    let cutoff = ctx.signal.received_at - Duration::minutes(ctx.params.news_blackout_minutes);
    let blocking = items.iter().find(|item| {
        item.timestamp > cutoff
            && item.timestamp <= ctx.signal.received_at
            && item.sentiment.abs() >= ctx.params.news_block_sentiment
    });

    match blocking {
        Some(item) => CheckResult::fail(format!(
            "high-impact news within {}m (sentiment {:+.2} for {})",
            ctx.params.news_blackout_minutes, item.sentiment, item.currency
        )),
        None => CheckResult::pass("no blocking news"),
    }
}

fn account_rule_check(ctx: &CheckContext<'_>) -> CheckResult {
    if ctx.halted {
        let reason = if ctx.halt_reason.is_empty() {
            "account is halted".to_string()
        } else {
            format!("account is halted: {}", ctx.halt_reason)
        };
        return CheckResult::fail(reason);
    }
    if ctx.challenge_breach {
        return CheckResult::fail("challenge loss limit breached".to_string());
    }
    CheckResult::pass("within account limits")
}

fn score_check(ctx: &CheckContext<'_>) -> CheckResult {
    let truth = ctx.report.truth_index;
    let threshold = ctx.report.min_score_threshold;
    let mut result = if truth < threshold {
        CheckResult::fail(format!("truth index {:.2} below minimum {:.0}", truth, threshold))
    } else {
        CheckResult::pass("truth index clears minimum")
    };
    result.score = Some(truth);
    result
}

fn strategy_match_check(ctx: &CheckContext<'_>) -> CheckResult {
    let strategy = &ctx.signal.strategy;
    if !ctx.allowed_strategies.is_empty()
        && !ctx
            .allowed_strategies
            .iter()
            .any(|s| s.eq_ignore_ascii_case(strategy))
    {
        return CheckResult::fail(format!("strategy {} not approved for account", strategy));
    }

    // Hard incompatibility, independent of the soft regime factor
    let category = StrategyCategory::classify(strategy);
    if ctx.signal.regime == Regime::Ranging && category == StrategyCategory::Breakout {
        return CheckResult::fail("breakout strategy incompatible with ranging regime".to_string());
    }

    CheckResult::pass("strategy approved")
}
