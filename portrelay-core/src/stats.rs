//! Traffic accounting.
//!
//! Cumulative byte counters are bumped at the moment bytes are observed and
//! never reset while the process lives. Rates are derived on demand by a
//! [`RateSampler`]: one difference quotient per sampling interval, no
//! smoothing.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Direction of relayed bytes, named from the target's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Target -> client
    In,
    /// Client -> target
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Lock-free counters shared by every task of an engine.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    connections: AtomicUsize,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, direction: Direction, bytes: usize) {
        let counter = match direction {
            Direction::In => &self.bytes_in,
            Direction::Out => &self.bytes_out,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Counts one open TCP connection for as long as it is alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<TrafficCounters>,
}

impl ConnectionGuard {
    pub fn new(counters: Arc<TrafficCounters>) -> Self {
        counters.connections.fetch_add(1, Ordering::Relaxed);
        crate::telemetry::connection_opened();
        Self { counters }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.connections.fetch_sub(1, Ordering::Relaxed);
        crate::telemetry::connection_closed();
    }
}

/// Difference-quotient rate sampler.
#[derive(Debug, Clone)]
pub struct RateSampler {
    min_interval: Duration,
    last_at: Instant,
    last_in: u64,
    last_out: u64,
    rate_in: f64,
    rate_out: f64,
}

impl RateSampler {
    pub fn new(min_interval: Duration) -> Self {
        Self::starting_at(Instant::now(), min_interval)
    }

    pub fn starting_at(now: Instant, min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_at: now,
            last_in: 0,
            last_out: 0,
            rate_in: 0.0,
            rate_out: 0.0,
        }
    }

    pub fn sample(&mut self, total_in: u64, total_out: u64) -> bool {
        self.sample_at(Instant::now(), total_in, total_out)
    }

    /// Recompute both rates from the totals observed at `now`.
    ///
    /// Returns false, leaving the previous rates untouched, when less than
    /// `min_interval` has elapsed since the last accepted sample.
    pub fn sample_at(&mut self, now: Instant, total_in: u64, total_out: u64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < self.min_interval || elapsed.is_zero() {
            return false;
        }
        let secs = elapsed.as_secs_f64();

        self.rate_in = total_in.saturating_sub(self.last_in) as f64 / secs;
        self.rate_out = total_out.saturating_sub(self.last_out) as f64 / secs;
        self.last_in = total_in;
        self.last_out = total_out;
        self.last_at = now;
        true
    }

    /// `(rate_in, rate_out)` in bytes per second
    pub fn rates(&self) -> (f64, f64) {
        (self.rate_in, self.rate_out)
    }
}

/// Snapshot of an engine's traffic, as serialized in status payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub bytes_in_rate: f64,
    pub bytes_out_rate: f64,
    pub total_in: u64,
    pub total_out: u64,
    pub connections: usize,
}

impl TrafficStats {
    pub fn capture(counters: &TrafficCounters, sampler: &RateSampler) -> Self {
        let (bytes_in_rate, bytes_out_rate) = sampler.rates();
        Self {
            bytes_in_rate,
            bytes_out_rate,
            total_in: counters.bytes_in(),
            total_out: counters.bytes_out(),
            connections: counters.connections(),
        }
    }
}
