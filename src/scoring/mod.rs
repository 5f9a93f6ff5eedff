pub mod engine;
pub mod weights;

pub use engine::{AccountSnapshot, FactorBreakdown, ScoreReport, ScoringEngine};
pub use weights::{ScoringWeights, WeightsStore};
