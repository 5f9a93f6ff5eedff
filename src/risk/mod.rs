pub mod challenge;
pub mod monitor;

pub use challenge::{ChallengeConfig, ChallengeStatus, ChallengeTracker, SafetyStatus};
pub use monitor::{HaltKind, RiskControlMonitor, RiskState};
