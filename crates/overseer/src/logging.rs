//! Logging setup

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the configured level. Fails if the level is not a
/// valid filter or a global subscriber is already set.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;

    Ok(())
}
