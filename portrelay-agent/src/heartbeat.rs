//! Periodic status push to the controller.

use crate::api::AgentState;
use crate::models::NodeStatus;
use portrelay_common::{RelayError, Result, HEARTBEAT_PATH, NODE_KEY_HEADER};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Heartbeat target and cadence.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub master_url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

/// POST one [`NodeStatus`] to the controller.
pub async fn send_heartbeat(
    http: &reqwest::Client,
    master_url: &str,
    state: &AgentState,
) -> Result<()> {
    let status = NodeStatus::collect(&state.node_name, &state.manager);
    let url = format!("{}{}", master_url.trim_end_matches('/'), HEARTBEAT_PATH);

    let response = http
        .post(&url)
        .header(NODE_KEY_HEADER, &*state.node_key)
        .json(&status)
        .send()
        .await
        .map_err(|e| RelayError::Remote(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RelayError::Remote(format!(
            "heartbeat rejected: {}",
            response.status()
        )));
    }
    Ok(())
}

/// Send a heartbeat every `interval` until cancelled. Failures are logged
/// and the next tick tries again.
pub async fn run_heartbeat(config: HeartbeatConfig, state: AgentState, cancel: CancellationToken) {
    let http = match reqwest::Client::builder().timeout(config.timeout).build() {
        Ok(http) => http,
        Err(e) => {
            warn!(error = %e, "Heartbeat disabled, cannot build HTTP client");
            return;
        }
    };

    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match send_heartbeat(&http, &config.master_url, &state).await {
            Ok(()) => debug!(master = %config.master_url, "Heartbeat sent"),
            Err(e) => warn!(master = %config.master_url, error = %e, "Failed to send heartbeat"),
        }
    }
}
