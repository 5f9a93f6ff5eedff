use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::SentryError;

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// One versioned weight vector for the truth index. Exactly one version
/// is active at a time; activation validates, it never normalizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub version: String,
    pub technical: f64,
    pub volatility: f64,
    pub regime: f64,
    pub sentiment: f64,
    pub historical: f64,
    pub psychological: f64,
    pub min_score_threshold: f64,
}

impl ScoringWeights {
    pub fn defaults(version: &str, min_score_threshold: f64) -> Self {
        Self {
            version: version.to_string(),
            technical: 0.25,
            volatility: 0.15,
            regime: 0.15,
            sentiment: 0.15,
            historical: 0.15,
            psychological: 0.15,
            min_score_threshold,
        }
    }

    pub fn sum(&self) -> f64 {
        self.technical
            + self.volatility
            + self.regime
            + self.sentiment
            + self.historical
            + self.psychological
    }

    pub fn validate(&self) -> Result<(), SentryError> {
        if self.version.trim().is_empty() {
            return Err(SentryError::Config("weights version must be non-empty".into()));
        }
        for (name, w) in [
            ("technical", self.technical),
            ("volatility", self.volatility),
            ("regime", self.regime),
            ("sentiment", self.sentiment),
            ("historical", self.historical),
            ("psychological", self.psychological),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(SentryError::Config(format!(
                    "weight {} must be within 0-1, got {}",
                    name, w
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(SentryError::Config(format!(
                "weights for version {} sum to {:.6}, expected 1.0",
                self.version, sum
            )));
        }
        if !self.min_score_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.min_score_threshold)
        {
            return Err(SentryError::Config(format!(
                "min_score_threshold must be within 0-100, got {}",
                self.min_score_threshold
            )));
        }
        Ok(())
    }
}

struct WeightsInner {
    versions: HashMap<String, ScoringWeights>,
    active: Option<String>,
}

/// Versioned weights repository. Switching versions is an explicit
/// `activate` that atomically swaps the active pointer under the lock —
/// an evaluation reads either the old vector or the new one, never a mix.
pub struct WeightsStore {
    inner: RwLock<WeightsInner>,
}

impl WeightsStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(WeightsInner {
                versions: HashMap::new(),
                active: None,
            }),
        }
    }

    /// Store seeded with the built-in default vector, already active.
    pub fn with_defaults(version: &str, min_score_threshold: f64) -> Self {
        let defaults = ScoringWeights::defaults(version, min_score_threshold);
        let mut versions = HashMap::new();
        versions.insert(defaults.version.clone(), defaults);
        Self {
            inner: RwLock::new(WeightsInner {
                versions,
                active: Some(version.to_string()),
            }),
        }
    }

    /// Insert or replace a version. Invalid vectors are rejected here, at
    /// load time — they never become activatable.
    pub async fn upsert(&self, weights: ScoringWeights) -> Result<(), SentryError> {
        weights.validate()?;
        let mut inner = self.inner.write().await;
        inner.versions.insert(weights.version.clone(), weights);
        Ok(())
    }

    /// Make `version` the single active vector. Re-validates, so a record
    /// that went bad since load still cannot activate; on failure the
    /// previously active version stays in place.
    pub async fn activate(&self, version: &str) -> Result<(), SentryError> {
        let mut inner = self.inner.write().await;
        let weights = inner
            .versions
            .get(version)
            .ok_or_else(|| SentryError::Config(format!("unknown weights version {}", version)))?;
        weights.validate()?;
        inner.active = Some(version.to_string());
        Ok(())
    }

    pub async fn active(&self) -> Option<ScoringWeights> {
        let inner = self.inner.read().await;
        let version = inner.active.as_ref()?;
        inner.versions.get(version).cloned()
    }
}

impl Default for WeightsStore {
    fn default() -> Self {
        Self::new()
    }
}
