use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing at `INFO`, overridable through `RUST_LOG`.
pub fn init() {
    initialize_tracing(LevelFilter::INFO);
}

/// Initialize tracing with a default level taken from configuration.
///
/// Unknown level names fall back to `INFO`. `RUST_LOG` still wins over the
/// configured default.
pub fn init_with_level(level: &str) {
    let parsed = LevelFilter::from_str(level).unwrap_or(LevelFilter::INFO);
    initialize_tracing(parsed);
}

fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    // A second initialisation (tests, embedded use) keeps the first subscriber.
    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        warn!("tracing subscriber already installed, keeping the existing one");
    }
}
