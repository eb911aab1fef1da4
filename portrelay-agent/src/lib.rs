//! Remote agent for portrelay.
//!
//! An agent hosts a [`Manager`] on a remote machine and exposes it over an
//! HTTP control surface secured by a shared node key. A controller drives it
//! through [`AgentClient`], which implements the same
//! [`RuleControl`](portrelay_core::RuleControl) contract as a local manager.

pub mod api;
pub mod client;
pub mod heartbeat;
pub mod models;

pub use api::{create_router, AgentState};
pub use client::AgentClient;
pub use heartbeat::{run_heartbeat, send_heartbeat, HeartbeatConfig};
pub use models::{ApiResponse, CreateTunnelRequest, NodeStatus};

use portrelay_common::{AgentConfig, RelayError, Result};
use portrelay_core::{auth, Manager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Sample every engine's rates once per `period` until cancelled.
pub async fn run_rate_tick(manager: Arc<Manager>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => manager.update_all_rates(),
        }
    }
}

/// A configured agent, ready to serve.
pub struct Agent {
    config: AgentConfig,
    manager: Arc<Manager>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        auth::validate_key_format(&config.node_key)?;
        let manager = Arc::new(Manager::new(config.engine.clone()));
        Ok(Self { config, manager })
    }

    pub fn manager(&self) -> Arc<Manager> {
        self.manager.clone()
    }

    /// Serve until `shutdown` fires, then stop every engine.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listen = self.config.listen;
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: listen,
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let state = AgentState::new(
            self.manager.clone(),
            &self.config.node_key,
            &self.config.node_name,
        );
        let background = shutdown.child_token();

        tokio::spawn(run_rate_tick(
            self.manager.clone(),
            self.config.rate_tick,
            background.clone(),
        ));

        if let Some(master_url) = &self.config.master_url {
            tokio::spawn(run_heartbeat(
                HeartbeatConfig {
                    master_url: master_url.clone(),
                    interval: self.config.heartbeat_interval,
                    timeout: self.config.heartbeat_timeout,
                },
                state.clone(),
                background.clone(),
            ));
        }

        info!(
            addr = ?listener.local_addr().ok(),
            node = %self.config.node_name,
            heartbeat = self.config.master_url.is_some(),
            "Agent listening"
        );

        let served = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        background.cancel();
        self.manager.stop_all().await;
        info!("Agent stopped");
        served.map_err(RelayError::from)
    }
}
