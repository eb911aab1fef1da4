//! Wire types of the agent control surface.

use portrelay_core::{Manager, Protocol, Rule, TunnelStatus};
use serde::{Deserialize, Serialize};

/// Envelope of every agent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Body of `POST /tunnels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTunnelRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub local_port: u16,
    pub target_ip: String,
    pub target_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub auto_start: bool,
}

impl CreateTunnelRequest {
    pub fn into_rule(self) -> (Rule, bool) {
        let mut rule = Rule::new(
            self.id,
            self.local_port,
            self.target_ip,
            self.target_port,
            self.protocol,
        );
        if let Some(name) = self.name {
            rule.name = name;
        }
        (rule, self.auto_start)
    }
}

impl From<(&Rule, bool)> for CreateTunnelRequest {
    fn from((rule, auto_start): (&Rule, bool)) -> Self {
        Self {
            id: rule.id.clone(),
            name: Some(rule.name.clone()),
            local_port: rule.local_port,
            target_ip: rule.target_ip.clone(),
            target_port: rule.target_port,
            protocol: rule.protocol,
            auto_start,
        }
    }
}

/// Node snapshot served by `GET /status` and pushed as heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_name: String,
    pub online: bool,
    /// Seconds since the agent started
    pub uptime: u64,
    pub tunnel_count: usize,
    pub tunnels: Vec<TunnelStatus>,
}

impl NodeStatus {
    pub fn collect(node_name: &str, manager: &Manager) -> Self {
        let tunnels = manager.all_status();
        Self {
            node_name: node_name.to_string(),
            online: true,
            uptime: manager.uptime(),
            tunnel_count: tunnels.len(),
            tunnels,
        }
    }
}
