//! Prometheus metrics for the relay engine.
//!
//! Recording is a no-op until [`init_metrics`] has been called, so library
//! users that never expose `/metrics` pay only an atomic load per event.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Metric handles, registered once in [`REGISTRY`].
pub struct RelayMetrics {
    /// Bytes relayed, labelled by protocol (tcp/udp) and direction (in/out)
    pub bytes_relayed: IntCounterVec,
    /// Open TCP connections across all engines
    pub active_connections: IntGauge,
    /// Live UDP sessions across all engines
    pub udp_sessions: IntGauge,
    /// Connect latency of successful probes
    pub probe_latency_ms: Histogram,
}

static METRICS: LazyLock<RelayMetrics> = LazyLock::new(|| {
    let bytes_relayed = IntCounterVec::new(
        Opts::new("portrelay_bytes_relayed_total", "Bytes relayed by all engines"),
        &["protocol", "direction"],
    )
    .unwrap();
    let active_connections = IntGauge::new(
        "portrelay_active_connections",
        "Open TCP connections across all engines",
    )
    .unwrap();
    let udp_sessions =
        IntGauge::new("portrelay_udp_sessions", "Live UDP sessions across all engines").unwrap();
    let probe_latency_ms = Histogram::with_opts(
        HistogramOpts::new(
            "portrelay_probe_latency_ms",
            "TCP connect latency measured by the latency probe",
        )
        .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 300.0, 500.0, 1000.0, 5000.0]),
    )
    .unwrap();

    REGISTRY.register(Box::new(bytes_relayed.clone())).unwrap();
    REGISTRY.register(Box::new(active_connections.clone())).unwrap();
    REGISTRY.register(Box::new(udp_sessions.clone())).unwrap();
    REGISTRY.register(Box::new(probe_latency_ms.clone())).unwrap();

    RelayMetrics {
        bytes_relayed,
        active_connections,
        udp_sessions,
        probe_latency_ms,
    }
});

/// Register the metrics and start recording.
pub fn init_metrics() {
    LazyLock::force(&METRICS);
    // Already registered on repeated calls.
    #[cfg(target_os = "linux")]
    let _ = REGISTRY.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ));
    ENABLED.store(true, Ordering::Release);
}

pub fn metrics_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

/// Metric handles; registration happens on first access.
pub fn relay_metrics() -> &'static RelayMetrics {
    &METRICS
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
