//! Declarative forwarding rules

use portrelay_common::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Transport protocol relayed by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forwarding rule: traffic arriving on `local_port` is relayed to
/// `target_ip:target_port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub local_port: u16,
    pub target_ip: String,
    pub target_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub enabled: bool,
    /// Unix seconds
    #[serde(default)]
    pub created_at: i64,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        local_port: u16,
        target_ip: impl Into<String>,
        target_port: u16,
        protocol: Protocol,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            local_port,
            target_ip: target_ip.into(),
            target_port,
            protocol,
            enabled: false,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Check the fields an engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RelayError::InvalidRule("id is required".into()));
        }
        if self.local_port == 0 {
            return Err(RelayError::InvalidRule(format!(
                "rule {}: local_port must be non-zero",
                self.id
            )));
        }
        if self.target_port == 0 {
            return Err(RelayError::InvalidRule(format!(
                "rule {}: target_port must be non-zero",
                self.id
            )));
        }
        if self.target_ip.trim().is_empty() {
            return Err(RelayError::InvalidRule(format!(
                "rule {}: target_ip is required",
                self.id
            )));
        }
        Ok(())
    }

    /// Wildcard address the engine binds.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.local_port)
    }

    /// `host:port` of the target, bracketing IPv6 literals.
    pub fn target_addr(&self) -> String {
        match self.target_ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.target_port),
            _ => format!("{}:{}", self.target_ip, self.target_port),
        }
    }
}
