pub mod checks;

pub use checks::{Check, CheckParams, CheckResult};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SentryError;
use crate::feeds::{NewsFeed, NewsItem};
use crate::models::{BlockedReason, Evaluation, Signal, SignalStatus};
use crate::pipeline::checks::CheckContext;
use crate::risk::{ChallengeStatus, HaltKind, RiskControlMonitor, SafetyStatus};
use crate::scoring::{AccountSnapshot, ScoringEngine};
use crate::store::{SentryStore, SignalRecord};

/// Runs the full check suite over one signal and persists exactly one
/// Evaluation for it. The whole evaluation happens under the signal's
/// account lock, so concurrent signals for one account serialize and the
/// daily counters never race.
pub struct ValidationPipeline {
    engine: ScoringEngine,
    store: Arc<SentryStore>,
    news: Arc<dyn NewsFeed>,
    params: CheckParams,
    news_window_minutes: i64,
    signal_window_hours: i64,
    lookup_timeout: Duration,
}

impl ValidationPipeline {
    pub fn new(
        cfg: &Config,
        engine: ScoringEngine,
        store: Arc<SentryStore>,
        news: Arc<dyn NewsFeed>,
    ) -> Self {
        Self {
            engine,
            store,
            news,
            params: CheckParams {
                news_blackout_minutes: cfg.news_blackout_minutes,
                news_block_sentiment: cfg.news_block_sentiment,
            },
            news_window_minutes: cfg.news_window_minutes,
            signal_window_hours: cfg.signal_window_hours,
            lookup_timeout: Duration::from_millis(cfg.feed_timeout_ms),
        }
    }

    /// Evaluate one signal. Malformed signals are the only error path;
    /// everything downstream degrades instead of failing.
    pub async fn evaluate(&self, signal: &Signal) -> Result<Evaluation, SentryError> {
        signal.validate()?;

        let key = signal.resolve_idempotency_key();
        let entry = self.store.account(&signal.account_id).await;
        let mut account = entry.lock().await;

        // Duplicate delivery: return the stored record, write nothing.
        // Checked under the account lock so two concurrent duplicates
        // cannot both miss.
        if let Some(existing) = self.store.evaluation_for(&key).await {
            debug!(signal_id = %signal.id, "duplicate delivery, returning stored evaluation");
            return Ok(existing);
        }

        let now = signal.received_at;
        let monitor = RiskControlMonitor::new(account.limits.clone());
        monitor.touch(&mut account.risk, now);

        let snapshot = AccountSnapshot {
            signals_last_window: account.signals_in_window(now, self.signal_window_hours),
            is_halted: account.risk.is_halted,
        };

        let news_items = self.fetch_news(signal).await;
        let report = self.engine.score(signal, &snapshot).await;

        let challenge_breach = match &account.challenge {
            Some(tracker) => match tracker.progress.status {
                ChallengeStatus::Active => tracker.get_safety_status() == SafetyStatus::Breach,
                ChallengeStatus::Failed => true,
                ChallengeStatus::Passed => false,
            },
            None => false,
        };

        let ctx = CheckContext {
            signal,
            report: &report,
            halted: account.risk.is_halted,
            halt_reason: &account.risk.halt_reason,
            manual_halt: account.risk.halt_kind == Some(HaltKind::Manual),
            challenge_breach,
            allowed_strategies: &account.allowed_strategies,
            news: news_items.as_deref(),
            params: &self.params,
        };

        let mut notes = report.notes.clone();
        let mut results: Vec<(Check, CheckResult)> = Vec::with_capacity(Check::ORDER.len());
        for check in Check::ORDER {
            let result = match check.evaluate(&ctx) {
                Ok(result) => result,
                Err(e) => {
                    // Fail-open boundary: a broken check never blocks
                    warn!(check = check.name(), error = %e, "check errored; treated as pass");
                    notes.push(format!("{} check errored ({}); treated as pass", check.name(), e));
                    CheckResult {
                        passed: true,
                        reason: "internal error; fail-open pass".to_string(),
                        score: None,
                    }
                }
            };
            results.push((check, result));
        }

        for (check, result) in &results {
            if !result.passed {
                notes.push(format!("{}: {}", check.name(), result.reason));
            }
        }

        let failing: Vec<Check> = results
            .iter()
            .filter(|(_, r)| !r.passed)
            .map(|(c, _)| *c)
            .collect();
        let passed = failing.is_empty();
        let blocked_reason = match failing.as_slice() {
            [] => BlockedReason::Passed,
            [Check::AccountRule] if ctx.manual_halt => BlockedReason::Manual,
            [single] => single.blocked_reason(),
            _ => BlockedReason::Multiple,
        };

        let check_ok = |target: Check| {
            results
                .iter()
                .find(|(c, _)| *c == target)
                .map(|(_, r)| r.passed)
                .unwrap_or(true)
        };

        let evaluation = Evaluation {
            signal_id: signal.id.clone(),
            account_id: signal.account_id.clone(),
            passed,
            blocked_reason,
            final_score: report.truth_index,
            status: report.status,
            news_ok: check_ok(Check::News),
            account_ok: check_ok(Check::AccountRule),
            score_ok: check_ok(Check::Score),
            strategy_ok: check_ok(Check::StrategyMatch),
            degraded: report.degraded,
            notes,
            recommendation: report.recommendation.clone(),
            created_at: now,
        };

        // Counter updates come after the verdict: this signal's own
        // rejection counts toward today's red total, and a halt tripped
        // here applies from the next signal on.
        let red = !passed || report.status == SignalStatus::Rejected;
        monitor.record_signal(&mut account.risk, red, now);
        account.signal_log.push(SignalRecord {
            id: signal.id.clone(),
            received_at: signal.received_at,
            symbol: signal.symbol.clone(),
            strategy: signal.strategy.clone(),
            passed,
            status: report.status,
            outcome: signal.outcome,
        });
        let outcomes = account.outcomes_for_day(now.date_naive());
        monitor.evaluate(&mut account.risk, &outcomes, now);

        let stored = self.store.insert_evaluation(&key, evaluation).await;
        drop(account);

        self.store.save_snapshot().await;
        Ok(stored)
    }

    async fn fetch_news(&self, signal: &Signal) -> Option<Vec<NewsItem>> {
        let fut = self.news.recent_news(&signal.symbol, self.news_window_minutes);
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(Ok(items)) => Some(items),
            Ok(Err(e)) => {
                warn!(symbol = %signal.symbol, "news lookup failed: {}", e);
                None
            }
            Err(_) => {
                warn!(symbol = %signal.symbol, "news lookup timed out");
                None
            }
        }
    }
}
