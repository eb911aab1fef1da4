//! Configuration types for the relay engine and the remote agent

use crate::constants::{DEFAULT_AGENT_PORT, DEFAULT_NODE_NAME};
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Timing and buffer settings shared by every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connect timeout when dialing the target for a TCP connection
    pub dial_timeout: Duration,
    /// Sliding read/write deadline of each TCP copy direction
    pub io_timeout: Duration,
    /// Buffer size of each TCP copy direction (default: 32KB)
    pub copy_buffer_size: usize,
    /// A UDP session with no target-side traffic for this long is evicted
    pub udp_idle_timeout: Duration,
    /// Read deadline of the shared inbound UDP socket
    pub udp_recv_poll: Duration,
    /// Largest datagram relayed in either direction
    pub udp_buffer_size: usize,
    /// Period of the latency probe
    pub probe_interval: Duration,
    /// Connect timeout of a single probe
    pub probe_timeout: Duration,
    /// Rate samples closer together than this are skipped
    pub rate_min_interval: Duration,
    /// Probe latency at or above this is classified "warning"
    pub latency_warning_ms: i64,
    /// Probe latency at or above this is classified "error"
    pub latency_error_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            copy_buffer_size: 32 * 1024,
            udp_idle_timeout: Duration::from_secs(30),
            udp_recv_poll: Duration::from_secs(1),
            udp_buffer_size: 65535,
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            rate_min_interval: Duration::from_millis(100),
            latency_warning_ms: 100,
            latency_error_ms: 300,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("dial_timeout", self.dial_timeout),
            ("io_timeout", self.io_timeout),
            ("udp_idle_timeout", self.udp_idle_timeout),
            ("udp_recv_poll", self.udp_recv_poll),
            ("probe_interval", self.probe_interval),
            ("probe_timeout", self.probe_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(RelayError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.copy_buffer_size == 0 || self.udp_buffer_size == 0 {
            return Err(RelayError::Config("buffer sizes must be non-zero".into()));
        }
        if self.latency_warning_ms > self.latency_error_ms {
            return Err(RelayError::Config(
                "latency_warning_ms must not exceed latency_error_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of a remote agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address of the HTTP control surface
    pub listen: SocketAddr,
    /// Shared secret expected in the node key header
    pub node_key: String,
    /// Display name reported in status and heartbeats
    pub node_name: String,
    /// Controller base URL; heartbeats are disabled when unset
    pub master_url: Option<String>,
    /// Period between heartbeats
    pub heartbeat_interval: Duration,
    /// Request timeout of a single heartbeat
    pub heartbeat_timeout: Duration,
    /// Period of the rate sampling tick
    pub rate_tick: Duration,
    /// Engine settings for every tunnel hosted by this agent
    pub engine: EngineConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], DEFAULT_AGENT_PORT).into(),
            node_key: String::new(),
            node_name: DEFAULT_NODE_NAME.to_string(),
            master_url: None,
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(5),
            rate_tick: Duration::from_secs(1),
            engine: EngineConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node_key.is_empty() {
            return Err(RelayError::Config("node_key is required".into()));
        }
        if let Some(url) = &self.master_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RelayError::Config(format!(
                    "master_url must be an http(s) URL, got {url}"
                )));
            }
        }
        if self.heartbeat_interval.is_zero() || self.rate_tick.is_zero() {
            return Err(RelayError::Config("intervals must be non-zero".into()));
        }
        self.engine.validate()
    }
}
