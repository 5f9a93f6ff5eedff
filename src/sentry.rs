use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use signal_sentry::config::{ChallengeDefaults, SharedConfig};
use signal_sentry::feeds::FeedClient;
use signal_sentry::models::{Outcome, Signal};
use signal_sentry::pipeline::ValidationPipeline;
use signal_sentry::risk::ChallengeConfig;
use signal_sentry::scoring::{ScoringEngine, WeightsStore};
use signal_sentry::store::SentryStore;

/// One line of stdin input. Signals produce exactly one evaluation line
/// on stdout; the control messages produce an ack.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Signal {
        #[serde(flatten)]
        signal: Signal,
    },
    Settle {
        account_id: String,
        signal_id: String,
        outcome: Outcome,
        pnl: f64,
    },
    Challenge {
        account_id: String,
        /// Thresholds may be omitted entirely; the configured defaults
        /// apply then.
        #[serde(flatten)]
        config: Option<ChallengeConfig>,
    },
    Halt {
        account_id: String,
        #[serde(default)]
        reason: String,
    },
    Reset {
        account_id: String,
    },
}

pub struct SignalSentry {
    pipeline: ValidationPipeline,
    store: Arc<SentryStore>,
    challenge_defaults: ChallengeDefaults,
    evaluated: usize,
    blocked: usize,
}

impl SignalSentry {
    pub async fn new(config: SharedConfig) -> Result<Self> {
        let cfg = config.read().await.clone();

        info!("{}", "=".repeat(60));
        info!("Signal Sentry starting up");
        info!("Feed service: {}", cfg.feed_base_url);
        info!(
            "Risk limits: {} consecutive losers | {} trades/day | {} red/day",
            cfg.risk.max_consecutive_losers,
            cfg.risk.max_daily_trades,
            cfg.risk.max_red_signals_per_day
        );
        info!(
            "Weights: {} (min score {})",
            cfg.active_weights_version, cfg.min_score_threshold
        );
        info!("{}", "=".repeat(60));

        let store = Arc::new(SentryStore::new(&cfg));
        let feed = Arc::new(FeedClient::new(&cfg)?);
        let weights = Arc::new(WeightsStore::with_defaults(
            &cfg.active_weights_version,
            cfg.min_score_threshold,
        ));
        let engine = ScoringEngine::new(
            &cfg,
            feed.clone(),
            feed.clone(),
            store.clone(),
            weights,
        );
        let pipeline = ValidationPipeline::new(&cfg, engine, store.clone(), feed);

        Ok(Self {
            pipeline,
            store,
            challenge_defaults: cfg.challenge,
            evaluated: 0,
            blocked: 0,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Sentry is running; reading JSONL from stdin. Press Ctrl+C to stop.");

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = tokio::io::stdout();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown().await;
                    return Ok(());
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(out) = self.handle_line(&line).await {
                                stdout.write_all(out.as_bytes()).await?;
                                stdout.write_all(b"\n").await?;
                                stdout.flush().await?;
                            }
                        }
                        Ok(None) => {
                            // Input drained
                            self.shutdown().await;
                            return Ok(());
                        }
                        Err(e) => {
                            error!("stdin read error: {}", e);
                            self.shutdown().await;
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let inbound: Inbound = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("unparseable input line: {}", e);
                return Some(json!({"type": "error", "error": e.to_string()}).to_string());
            }
        };

        match inbound {
            Inbound::Signal { signal } => match self.pipeline.evaluate(&signal).await {
                Ok(evaluation) => {
                    self.evaluated += 1;
                    if !evaluation.passed {
                        self.blocked += 1;
                    }
                    info!(
                        signal_id = %signal.id,
                        session = %signal.session_tag(),
                        passed = evaluation.passed,
                        score = evaluation.final_score,
                        reason = %evaluation.blocked_reason,
                        "signal evaluated"
                    );
                    serde_json::to_string(&evaluation).ok()
                }
                Err(e) => {
                    warn!(signal_id = %signal.id, "signal rejected: {}", e);
                    Some(
                        json!({"type": "error", "signal_id": signal.id, "error": e.to_string()})
                            .to_string(),
                    )
                }
            },
            Inbound::Settle {
                account_id,
                signal_id,
                outcome,
                pnl,
            } => {
                let result = self
                    .store
                    .record_outcome(&account_id, &signal_id, outcome, pnl, Utc::now())
                    .await;
                self.store.save_snapshot().await;
                match result {
                    Ok(()) => Some(
                        json!({"type": "ack", "signal_id": signal_id, "outcome": outcome.as_str()})
                            .to_string(),
                    ),
                    Err(e) => Some(
                        json!({"type": "error", "signal_id": signal_id, "error": e.to_string()})
                            .to_string(),
                    ),
                }
            }
            Inbound::Challenge { account_id, config } => {
                let config = config
                    .unwrap_or_else(|| ChallengeConfig::from_defaults(&self.challenge_defaults));
                info!(account_id = %account_id, size = config.account_size, "challenge activated");
                self.store.activate_challenge(&account_id, config).await;
                self.store.save_snapshot().await;
                Some(json!({"type": "ack", "account_id": account_id}).to_string())
            }
            Inbound::Halt { account_id, reason } => {
                self.store.halt_account(&account_id, &reason, Utc::now()).await;
                self.store.save_snapshot().await;
                Some(json!({"type": "ack", "account_id": account_id}).to_string())
            }
            Inbound::Reset { account_id } => {
                self.store.reset_account(&account_id, Utc::now()).await;
                self.store.save_snapshot().await;
                Some(json!({"type": "ack", "account_id": account_id}).to_string())
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.store.save_snapshot().await;
        info!(
            "Evaluated {} signals ({} blocked)",
            self.evaluated, self.blocked
        );
        info!("Sentry stopped.");
    }
}
