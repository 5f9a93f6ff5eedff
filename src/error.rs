use thiserror::Error;

/// Errors the decision layer distinguishes by policy. Collaborator
/// failures are deliberately absent: lookups fail open to neutral
/// factor scores and never surface as errors (see scoring::engine).
#[derive(Debug, Error)]
pub enum SentryError {
    /// Malformed or missing required signal fields. Rejected before the
    /// pipeline runs; no Evaluation is produced.
    #[error("invalid signal: {0}")]
    Data(String),

    /// A configuration record that must never reach evaluation time in a
    /// bad state, e.g. a weights version whose weights do not sum to 1.0.
    #[error("invalid config: {0}")]
    Config(String),

    /// Persistence failure (snapshot write/read).
    #[error("store error: {0}")]
    Store(String),
}
