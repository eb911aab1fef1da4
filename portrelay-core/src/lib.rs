//! Tunnel engine for portrelay.
//!
//! An [`Engine`] relays one [`Rule`]: it binds the rule's local port, forwards
//! bytes to and from the target, counts them, and probes the target for
//! latency. A [`Manager`] owns one engine per rule id and is the local
//! implementation of [`RuleControl`].

pub mod auth;
pub mod control;
pub mod engine;
pub mod latency;
pub mod manager;
pub mod rule;
pub mod stats;
pub mod tcp;
mod telemetry;
pub mod transport;
pub mod udp;

// Re-export specific items for convenience
pub use control::RuleControl;
pub use engine::{Engine, TunnelStatus};
pub use latency::{LatencyInfo, LatencyStatus, LatencyThresholds};
pub use manager::{GlobalTraffic, Manager};
pub use rule::{Protocol, Rule};
pub use stats::{Direction, RateSampler, TrafficCounters, TrafficStats};
