//! Bridges engine events to the optional Prometheus metrics.

use crate::rule::Protocol;
use crate::stats::Direction;

#[cfg(feature = "metrics")]
mod enabled {
    use super::{Direction, Protocol};
    use portrelay_observability::{metrics_enabled, relay_metrics};

    pub(crate) fn bytes(protocol: Protocol, direction: Direction, n: usize) {
        if metrics_enabled() {
            relay_metrics()
                .bytes_relayed
                .with_label_values(&[protocol.as_str(), direction.as_str()])
                .inc_by(n as u64);
        }
    }

    pub(crate) fn connection_opened() {
        if metrics_enabled() {
            relay_metrics().active_connections.inc();
        }
    }

    pub(crate) fn connection_closed() {
        if metrics_enabled() {
            relay_metrics().active_connections.dec();
        }
    }

    pub(crate) fn session_opened() {
        if metrics_enabled() {
            relay_metrics().udp_sessions.inc();
        }
    }

    pub(crate) fn session_closed() {
        if metrics_enabled() {
            relay_metrics().udp_sessions.dec();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn probe_latency(ms: i64) {
        if metrics_enabled() {
            relay_metrics().probe_latency_ms.observe(ms as f64);
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod enabled {
    use super::{Direction, Protocol};

    pub(crate) fn bytes(_protocol: Protocol, _direction: Direction, _n: usize) {}
    pub(crate) fn connection_opened() {}
    pub(crate) fn connection_closed() {}
    pub(crate) fn session_opened() {}
    pub(crate) fn session_closed() {}
    pub(crate) fn probe_latency(_ms: i64) {}
}

pub(crate) use enabled::*;
