pub mod metrics;
pub mod tracing;

pub use metrics::{gather_metrics, init_metrics, metrics_enabled, relay_metrics, RelayMetrics, REGISTRY};
pub use tracing::{init_logging, LogFormat};

/// Basic initialization: logging always, metrics on request
pub fn init_basic_observability(format: LogFormat, enable_metrics: bool) {
    if enable_metrics {
        init_metrics();
    }
    init_logging(format);
}

/// Minimal logging setup without metrics
pub fn init_minimal_logging() {
    init_logging(LogFormat::Pretty);
}
