//! # `portrelay`
//!
//! Expose a TCP or UDP service by relaying it through a locally bound port.
//!
//! ## Overview
//!
//! An [`Engine`] binds one rule's local port and forwards bytes to and from
//! its target, counting traffic and probing the target's latency. A
//! [`Manager`] keeps one engine per rule id. The same rules can run on a
//! remote machine behind an agent, driven through [`AgentClient`]; both the
//! manager and the client implement [`RuleControl`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portrelay::prelude::*;
//!
//! # async fn run() -> portrelay::Result<()> {
//! let manager = Manager::default();
//! let mut rule = Rule::new("ssh", 2222, "10.0.0.5", 22, Protocol::Tcp);
//! rule.enabled = true;
//! manager.add_rule(rule).await?;
//!
//! let status = manager.status("ssh")?;
//! println!("running: {}", status.running);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `portrelay-common` - Errors, configuration and constants
//! - `portrelay-core` - Engine, TCP relay, UDP multiplexer, accounting
//! - `portrelay-agent` - HTTP control surface and its client

// Re-export subcrates
pub use portrelay_agent as agent;
pub use portrelay_common as common;
pub use portrelay_core as relay;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{AgentClient, NodeStatus};
    pub use crate::common::{EngineConfig, RelayError, Result};
    pub use crate::relay::{
        Engine, LatencyStatus, Manager, Protocol, Rule, RuleControl, TrafficStats, TunnelStatus,
    };
}

// Convenience re-exports at crate root
pub use agent::{Agent, AgentClient};
pub use common::{AgentConfig, EngineConfig, RelayError, Result};
pub use relay::{Engine, Manager, Protocol, Rule, RuleControl, TunnelStatus};
