mod metrics;

pub use metrics::{EngineMetrics, MetricsSnapshot};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the RUST_LOG env var.
    pub log_level: Level,
    /// Emit one JSON object per line instead of human-readable output.
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_output: false,
        }
    }
}

/// Initialize the tracing subscriber. Call once at startup; returns false if
/// a subscriber was already installed (e.g. by a test harness).
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    if config.json_output {
        tracing_subscriber::fmt()
            .json()
            .with_target(true)
            .with_env_filter(env_filter)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_target(true)
            .with_env_filter(env_filter)
            .try_init()
            .is_ok()
    }
}
