//! Tracing subscriber setup shared by all worker binaries

use crate::config::{LogFormat, Settings};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber according to `LOG_LEVEL` and
/// `LOG_FORMAT`.
///
/// Called exactly once at the top of every worker `main`. An explicit
/// `RUST_LOG` takes precedence over `LOG_LEVEL` so operators can raise
/// per-module verbosity without touching service config.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_lowercase()));

    match settings.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(false)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
