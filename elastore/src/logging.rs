//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber. RUST_LOG overrides `config.level` and
/// LOG_FORMAT overrides `config.log_format`. Returns false when a subscriber
/// was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    let result = if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.is_ok()
}
