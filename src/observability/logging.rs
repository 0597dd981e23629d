//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` takes precedence over the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A bare level applies to this crate and tower_http; anything else is used verbatim.
fn default_directives(log_level: &str) -> String {
    let level = log_level.trim();
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => {
            format!("ip_allowlist_gateway={level},tower_http={level}")
        }
        _ => level.to_string(),
    }
}
