use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Config, RiskLimits};
use crate::error::SentryError;
use crate::feeds::{PerformanceSource, StrategyPerf};
use crate::models::{Evaluation, Outcome, SignalStatus};
use crate::risk::{ChallengeConfig, ChallengeTracker, RiskControlMonitor};
use crate::risk::monitor::RiskState;

/// One entry in an account's append-only signal log. Serves the
/// consecutive-loss walkback and the trailing frequency count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub symbol: String,
    pub strategy: String,
    pub passed: bool,
    pub status: SignalStatus,
    pub outcome: Outcome,
}

/// Everything the pipeline mutates for one account. Held behind a
/// per-account Mutex so concurrent signals for the same account are
/// serialized before counters are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub limits: RiskLimits,
    pub risk: RiskState,
    #[serde(default)]
    pub challenge: Option<ChallengeTracker>,
    /// Empty means every strategy is allowed.
    #[serde(default)]
    pub allowed_strategies: Vec<String>,
    #[serde(default)]
    pub signal_log: Vec<SignalRecord>,
}

impl AccountState {
    fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            risk: RiskState::default(),
            challenge: None,
            allowed_strategies: Vec::new(),
            signal_log: Vec::new(),
        }
    }

    /// Outcomes of signals received on `date`, oldest first. The loss
    /// streak is a same-day measure: an auto-resumed account starts the
    /// new day with a clean slate.
    pub fn outcomes_for_day(&self, date: chrono::NaiveDate) -> Vec<Outcome> {
        self.signal_log
            .iter()
            .filter(|r| r.received_at.date_naive() == date)
            .map(|r| r.outcome)
            .collect()
    }

    /// Signals received in the trailing window ending at `at`.
    pub fn signals_in_window(&self, at: DateTime<Utc>, hours: i64) -> usize {
        let cutoff = at - Duration::hours(hours);
        self.signal_log
            .iter()
            .filter(|r| r.received_at > cutoff && r.received_at <= at)
            .count()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    accounts: HashMap<String, AccountState>,
    evaluations: HashMap<String, Evaluation>,
    performance: HashMap<String, StrategyPerf>,
}

/// In-memory store with JSON snapshot persistence. Evaluations are keyed
/// by idempotency key and never overwritten: the first writer wins and
/// every later insert gets the stored record back.
pub struct SentryStore {
    accounts: Mutex<HashMap<String, Arc<Mutex<AccountState>>>>,
    evaluations: Mutex<HashMap<String, Evaluation>>,
    performance: Mutex<HashMap<String, StrategyPerf>>,
    default_limits: RiskLimits,
    state_file: Option<PathBuf>,
}

impl SentryStore {
    pub fn new(cfg: &Config) -> Self {
        let state_file = Path::new(&cfg.state_dir).join("sentry_state.json");
        let mut store = Self {
            accounts: Mutex::new(HashMap::new()),
            evaluations: Mutex::new(HashMap::new()),
            performance: Mutex::new(HashMap::new()),
            default_limits: cfg.risk.clone(),
            state_file: Some(state_file),
        };
        store.load_snapshot();
        store
    }

    /// Store without snapshot persistence (tests, offline runs).
    pub fn in_memory(default_limits: RiskLimits) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            evaluations: Mutex::new(HashMap::new()),
            performance: Mutex::new(HashMap::new()),
            default_limits,
            state_file: None,
        }
    }

    /// Entry for an account, created lazily from the default limits on
    /// the first signal.
    pub async fn account(&self, account_id: &str) -> Arc<Mutex<AccountState>> {
        let mut accounts = self.accounts.lock().await;
        accounts
            .entry(account_id.to_string())
            .or_insert_with(|| {
                debug!(account_id, "creating account state");
                Arc::new(Mutex::new(AccountState::new(self.default_limits.clone())))
            })
            .clone()
    }

    pub async fn evaluation_for(&self, key: &str) -> Option<Evaluation> {
        self.evaluations.lock().await.get(key).cloned()
    }

    /// Unique insert: returns the evaluation actually stored under the
    /// key. A duplicate delivery gets the original back untouched.
    pub async fn insert_evaluation(&self, key: &str, evaluation: Evaluation) -> Evaluation {
        let mut evaluations = self.evaluations.lock().await;
        if let Some(existing) = evaluations.get(key) {
            debug!(key, "duplicate evaluation insert; returning stored record");
            return existing.clone();
        }
        evaluations.insert(key.to_string(), evaluation.clone());
        evaluation
    }

    pub async fn evaluation_count(&self) -> usize {
        self.evaluations.lock().await.len()
    }

    pub async fn activate_challenge(&self, account_id: &str, config: ChallengeConfig) {
        let entry = self.account(account_id).await;
        let mut account = entry.lock().await;
        account.challenge = Some(ChallengeTracker::new(config));
    }

    pub async fn set_allowed_strategies(&self, account_id: &str, strategies: Vec<String>) {
        let entry = self.account(account_id).await;
        entry.lock().await.allowed_strategies = strategies;
    }

    pub async fn halt_account(&self, account_id: &str, reason: &str, now: DateTime<Utc>) {
        let entry = self.account(account_id).await;
        let mut account = entry.lock().await;
        let monitor = RiskControlMonitor::new(account.limits.clone());
        monitor.halt_manual(&mut account.risk, reason, now);
    }

    pub async fn reset_account(&self, account_id: &str, now: DateTime<Utc>) {
        let entry = self.account(account_id).await;
        let mut account = entry.lock().await;
        let monitor = RiskControlMonitor::new(account.limits.clone());
        monitor.reset(&mut account.risk, now);
    }

    /// Settlement: sets the signal outcome, feeds the performance store
    /// and the challenge tracker, and re-evaluates the halt machine for
    /// the loss streak. Settled outcomes are immutable; a second
    /// settlement for the same signal is ignored.
    pub async fn record_outcome(
        &self,
        account_id: &str,
        signal_id: &str,
        outcome: Outcome,
        pnl: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SentryError> {
        if !outcome.is_settled() {
            return Err(SentryError::Data("settlement outcome must be win or loss".into()));
        }

        let entry = self.account(account_id).await;
        let mut account = entry.lock().await;

        let (symbol, strategy) = {
            let record = account
                .signal_log
                .iter_mut()
                .find(|r| r.id == signal_id)
                .ok_or_else(|| {
                    SentryError::Data(format!("unknown signal {} for account {}", signal_id, account_id))
                })?;

            if record.outcome.is_settled() {
                warn!(signal_id, "settlement ignored: outcome already recorded");
                return Ok(());
            }
            record.outcome = outcome;
            (record.symbol.clone(), record.strategy.clone())
        };

        {
            let mut performance = self.performance.lock().await;
            let perf = performance
                .entry(perf_key(&strategy, &symbol))
                .or_default();
            perf.total += 1;
            if outcome == Outcome::Win {
                perf.wins += 1;
            }
        }

        if let Some(tracker) = &mut account.challenge {
            tracker.record_settlement(pnl, now.date_naive());
        }

        let monitor = RiskControlMonitor::new(account.limits.clone());
        let outcomes = account.outcomes_for_day(now.date_naive());
        monitor.evaluate(&mut account.risk, &outcomes, now);

        Ok(())
    }

    /// Best-effort JSON snapshot. Must not be called while holding an
    /// account guard: it locks every account entry in turn.
    pub async fn save_snapshot(&self) {
        let Some(path) = &self.state_file else { return };

        let entries: Vec<(String, Arc<Mutex<AccountState>>)> = {
            let accounts = self.accounts.lock().await;
            accounts.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut snapshot = Snapshot::default();
        for (id, entry) in entries {
            snapshot.accounts.insert(id, entry.lock().await.clone());
        }
        snapshot.evaluations = self.evaluations.lock().await.clone();
        snapshot.performance = self.performance.lock().await.clone();

        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("snapshot write failed: {}", e);
                }
            }
            Err(e) => warn!("snapshot serialize failed: {}", e),
        }
    }

    fn load_snapshot(&mut self) {
        let Some(path) = &self.state_file else { return };
        let Ok(content) = fs::read_to_string(path) else { return };

        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) => {
                let accounts = snapshot
                    .accounts
                    .into_iter()
                    .map(|(k, v)| (k, Arc::new(Mutex::new(v))))
                    .collect();
                self.accounts = Mutex::new(accounts);
                self.evaluations = Mutex::new(snapshot.evaluations);
                self.performance = Mutex::new(snapshot.performance);
                debug!("snapshot loaded from {}", path.display());
            }
            Err(e) => warn!("snapshot parse failed, starting fresh: {}", e),
        }
    }
}

fn perf_key(strategy: &str, symbol: &str) -> String {
    format!("{}|{}", strategy, symbol)
}

#[async_trait]
impl PerformanceSource for SentryStore {
    async fn strategy_performance(&self, strategy: &str, symbol: &str) -> Result<StrategyPerf> {
        let performance = self.performance.lock().await;
        Ok(performance
            .get(&perf_key(strategy, symbol))
            .copied()
            .unwrap_or_default())
    }
}
