//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// HTTP stack crates are noisy at debug level
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "warp=info"];

/// Setup tracing subscriber for the application
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(default_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| crate::Error::Logging(e.to_string()))?;

    Ok(())
}

fn default_filter(level: &str) -> crate::Result<EnvFilter> {
    let directives = std::iter::once(level)
        .chain(QUIET_DIRECTIVES.iter().copied())
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(directives)
        .map_err(|e| crate::Error::Config(format!("Invalid log filter '{}': {}", level, e)))
}
