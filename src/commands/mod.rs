//! CLI command implementations

pub mod check;
pub mod serve;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing from the logging config plus CLI overrides
///
/// `--verbose` forces debug level; `--log-format` overrides the configured
/// format. `RUST_LOG` wins over both when set.
pub fn setup_tracing(config: &LoggingConfig, format_override: Option<&str>, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("kelpie={level},info")));

    let format = format_override.unwrap_or(config.format.as_str());
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
