//! Structured logging setup.
//!
//! `RUST_LOG` wins over the configured level when set. JSON goes to stderr by
//! default; `pretty` is the human-readable fmt layer.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{normalize_log_level, LogFormat, ObservabilityConfig};

/// Filter directives for a configured level: our crate and the HTTP layer at
/// `level`, everything else at warn. Unknown levels mean info.
pub fn default_directives(level: &str) -> String {
    let level = normalize_log_level(level);
    format!("warn,oyaki={level},tower_http={level}")
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
}
