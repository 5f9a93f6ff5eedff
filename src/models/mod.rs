pub mod evaluation;
pub mod regime;
pub mod session;
pub mod signal;

pub use evaluation::{BlockedReason, Evaluation, SignalStatus};
pub use regime::{Regime, StrategyCategory};
pub use session::Session;
pub use signal::{Outcome, Side, Signal, Timeframe};
