//! Default ports, addresses and header names for portrelay services.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! across the engine, the agent and the CLI.

/// Default port for the remote agent HTTP control surface.
pub const DEFAULT_AGENT_PORT: u16 = 9090;

/// Default bind address for the agent control surface (`0.0.0.0:9090`).
pub const DEFAULT_AGENT_LISTEN: &str = "0.0.0.0:9090";

/// Display name reported by an agent that was not given one.
pub const DEFAULT_NODE_NAME: &str = "Node";

/// Header carrying the shared secret between controller and agent.
pub const NODE_KEY_HEADER: &str = "X-Node-Key";

/// Controller path that receives agent heartbeats.
pub const HEARTBEAT_PATH: &str = "/api/nodes/heartbeat";
