//! Telemetry
//!
//! Sets up `tracing-subscriber`. Logs go to stderr so `--json` output on
//! stdout stays machine readable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_filter(log_level: &str) -> String {
    format!("warn,concierge_engine={},concierge={}", log_level, log_level)
}

/// Initialize the tracing subscriber.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > "info".
/// Debug builds print pretty output; release builds print JSON with spans.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
