//! Latency probe.
//!
//! Every engine probes its target with a plain TCP connect on a fixed
//! period, whatever the rule's protocol. UDP rules therefore report TCP
//! reachability of the target host and port, not UDP round-trip time.

use portrelay_common::EngineConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Latency value reported when the probe could not connect
pub const LATENCY_UNREACHABLE: i64 = -1;

/// Classification of the last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyStatus {
    /// No probe has completed yet
    #[default]
    Unknown,
    Normal,
    Warning,
    Error,
}

/// Result of the most recent probe, as serialized in status payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyInfo {
    /// Milliseconds, -1 when the target was unreachable
    pub latency: i64,
    pub status: LatencyStatus,
    /// Unix seconds of the last probe, 0 before the first one
    pub last_check: i64,
}

impl Default for LatencyInfo {
    fn default() -> Self {
        Self {
            latency: 0,
            status: LatencyStatus::Unknown,
            last_check: 0,
        }
    }
}

impl LatencyInfo {
    /// Record a probe outcome; `None` means the connect failed.
    pub fn record(&mut self, measured: Option<Duration>, thresholds: LatencyThresholds) {
        self.last_check = chrono::Utc::now().timestamp();
        match measured {
            Some(elapsed) => {
                let ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
                self.latency = ms;
                self.status = thresholds.classify(ms);
            }
            None => {
                self.latency = LATENCY_UNREACHABLE;
                self.status = LatencyStatus::Error;
            }
        }
    }
}

/// Boundaries between normal, warning and error latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyThresholds {
    pub warning_ms: i64,
    pub error_ms: i64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            warning_ms: 100,
            error_ms: 300,
        }
    }
}

impl From<&EngineConfig> for LatencyThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            warning_ms: config.latency_warning_ms,
            error_ms: config.latency_error_ms,
        }
    }
}

impl LatencyThresholds {
    pub fn classify(self, latency_ms: i64) -> LatencyStatus {
        if latency_ms < 0 {
            LatencyStatus::Error
        } else if latency_ms < self.warning_ms {
            LatencyStatus::Normal
        } else if latency_ms < self.error_ms {
            LatencyStatus::Warning
        } else {
            LatencyStatus::Error
        }
    }
}

/// Time a single TCP connect to `target`.
pub async fn probe(target: &str, timeout: Duration) -> Option<Duration> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let elapsed = start.elapsed();
            drop(stream);
            Some(elapsed)
        }
        Ok(Err(e)) => {
            trace!(target = %target, error = %e, "Probe connect failed");
            None
        }
        Err(_) => {
            trace!(target = %target, "Probe connect timed out");
            None
        }
    }
}

/// Probe `target` every `probe_interval` until cancelled.
pub(crate) async fn run_probe_loop(
    rule_id: Arc<str>,
    target: Arc<str>,
    config: Arc<EngineConfig>,
    latency: Arc<Mutex<LatencyInfo>>,
    cancel: CancellationToken,
) {
    let thresholds = LatencyThresholds::from(config.as_ref());
    let period = config.probe_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let measured = tokio::select! {
            _ = cancel.cancelled() => break,
            measured = probe(&target, config.probe_timeout) => measured,
        };

        if let Some(elapsed) = measured {
            crate::telemetry::probe_latency(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        }

        let mut info = latency.lock().unwrap_or_else(PoisonError::into_inner);
        info.record(measured, thresholds);
        debug!(
            rule_id = %rule_id,
            latency_ms = info.latency,
            status = ?info.status,
            "Latency probe"
        );
    }
}
