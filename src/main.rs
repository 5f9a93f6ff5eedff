mod sentry;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use signal_sentry::config::Config;

use crate::sentry::SignalSentry;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing. Logs go to stderr — stdout carries the
    // evaluation JSONL stream.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let shared = cfg.shared();

    let mut sentry = SignalSentry::new(shared).await?;
    sentry.run().await?;

    Ok(())
}
