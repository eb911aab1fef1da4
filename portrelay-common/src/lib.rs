//! Common utilities and types for `portrelay`

pub mod config;
pub mod constants;
pub mod error;

pub use config::{AgentConfig, EngineConfig};
pub use constants::{
    DEFAULT_AGENT_LISTEN, DEFAULT_AGENT_PORT, DEFAULT_NODE_NAME, HEARTBEAT_PATH, NODE_KEY_HEADER,
};
pub use error::{RelayError, Result};
