//! Engine lifecycle: one start/stop-able relay per rule.
//!
//! An engine is either stopped or running. While running it owns exactly one
//! bound socket on the rule's local port, a protocol loop, and a latency
//! probe, all tied to one cancellation token.
//!
//! [`Engine::stop`] closes the bound socket before returning, so the port is
//! free for any new bind right away. It does not wait for tasks: they notice
//! cancellation at their next safe point and live TCP connections drain
//! within `io_timeout`.

use crate::latency::{self, LatencyInfo};
use crate::rule::{Protocol, Rule};
use crate::stats::{RateSampler, TrafficCounters, TrafficStats};
use crate::tcp::{self, TcpRelay};
use crate::transport::{self, ReleasableSocket};
use crate::udp::{self, UdpRelay, UdpSessionTable};
use portrelay_common::{EngineConfig, RelayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time view of an engine, as serialized to dashboards and
/// heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub rule: Rule,
    pub traffic: TrafficStats,
    pub latency: LatencyInfo,
    pub running: bool,
}

enum BoundSocket {
    Tcp(ReleasableSocket<TcpListener>),
    Udp(ReleasableSocket<UdpSocket>),
}

impl BoundSocket {
    fn close(&self) {
        match self {
            Self::Tcp(listener) => listener.close(),
            Self::Udp(socket) => socket.close(),
        };
    }
}

/// Everything one run of the engine owns.
struct Run {
    cancel: CancellationToken,
    loop_task: JoinHandle<()>,
    socket: BoundSocket,
    sessions: Option<Arc<UdpSessionTable>>,
}

impl Run {
    /// Signal every task, then release the port and the session sockets.
    fn shut_down(&self) {
        self.cancel.cancel();
        self.socket.close();
        if let Some(sessions) = &self.sessions {
            sessions.clear();
        }
    }
}

enum Lifecycle {
    Stopped {
        /// Protocol loop of the previous run, possibly still exiting
        release: Option<JoinHandle<()>>,
    },
    Running(Run),
}

struct EngineState {
    rule: Rule,
    lifecycle: Lifecycle,
    sampler: RateSampler,
    /// Bumped by every stop; a start that sees it move aborts its run.
    stop_epoch: u64,
}

/// Runtime relay for one [`Rule`].
pub struct Engine {
    state: Mutex<EngineState>,
    counters: Arc<TrafficCounters>,
    latency: Arc<Mutex<LatencyInfo>>,
    config: Arc<EngineConfig>,
    /// Serializes start and stop_and_wait; never taken by the relay tasks.
    transition: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(rule: Rule) -> Self {
        Self::with_config(rule, Arc::new(EngineConfig::default()))
    }

    pub fn with_config(rule: Rule, config: Arc<EngineConfig>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                rule,
                lifecycle: Lifecycle::Stopped { release: None },
                sampler: RateSampler::new(config.rate_min_interval),
                stop_epoch: 0,
            }),
            counters: Arc::new(TrafficCounters::new()),
            latency: Arc::new(Mutex::new(LatencyInfo::default())),
            config,
            transition: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the rule's local port and start relaying.
    ///
    /// Succeeds without binding again when already running. On a bind
    /// failure the engine stays stopped and the error is returned. A
    /// [`Engine::stop`] that lands while the bind is in flight wins: the
    /// fresh socket is released and the engine stays stopped.
    pub async fn start(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        let (rule, epoch) = {
            let state = self.lock_state();
            if matches!(state.lifecycle, Lifecycle::Running(_)) {
                return Ok(());
            }
            (state.rule.clone(), state.stop_epoch)
        };
        rule.validate()?;

        let run = match self.spawn_relay(&rule).await {
            Ok(run) => run,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Failed to start tunnel");
                return Err(e);
            }
        };
        let cancel = run.cancel.clone();

        if !self.commit_start(epoch, run) {
            debug!(rule_id = %rule.id, "Stop requested during start, tunnel not started");
            return Ok(());
        }

        tokio::spawn(latency::run_probe_loop(
            Arc::from(rule.id.as_str()),
            Arc::from(rule.target_addr()),
            self.config.clone(),
            self.latency.clone(),
            cancel,
        ));

        info!(
            rule_id = %rule.id,
            protocol = %rule.protocol,
            local_port = rule.local_port,
            target = %rule.target_addr(),
            "Tunnel started"
        );
        Ok(())
    }

    async fn spawn_relay(&self, rule: &Rule) -> Result<Run> {
        let rule_id: Arc<str> = Arc::from(rule.id.as_str());
        let target: Arc<str> = Arc::from(rule.target_addr());
        let cancel = CancellationToken::new();

        match rule.protocol {
            Protocol::Tcp => {
                let listener =
                    ReleasableSocket::new(transport::bind_tcp_listener(rule.local_addr())?);
                let relay = TcpRelay {
                    rule_id,
                    target,
                    config: self.config.clone(),
                    counters: self.counters.clone(),
                };
                let loop_task = tokio::spawn(tcp::run_accept_loop(
                    listener.clone(),
                    relay,
                    cancel.clone(),
                ));
                Ok(Run {
                    cancel,
                    loop_task,
                    socket: BoundSocket::Tcp(listener),
                    sessions: None,
                })
            }
            Protocol::Udp => {
                let socket =
                    ReleasableSocket::new(transport::bind_udp_socket(rule.local_addr()).await?);
                let sessions = Arc::new(UdpSessionTable::new());
                let relay = UdpRelay {
                    rule_id,
                    target,
                    config: self.config.clone(),
                    counters: self.counters.clone(),
                    sessions: sessions.clone(),
                };
                let loop_task =
                    tokio::spawn(udp::run_udp_loop(socket.clone(), relay, cancel.clone()));
                Ok(Run {
                    cancel,
                    loop_task,
                    socket: BoundSocket::Udp(socket),
                    sessions: Some(sessions),
                })
            }
        }
    }

    /// Publish `run` as the running state unless a stop happened since
    /// `epoch` was read. A superseded run is shut down on the spot.
    fn commit_start(&self, epoch: u64, run: Run) -> bool {
        let mut state = self.lock_state();
        if state.stop_epoch != epoch {
            run.shut_down();
            state.rule.enabled = false;
            state.lifecycle = Lifecycle::Stopped {
                release: Some(run.loop_task),
            };
            return false;
        }
        state.rule.enabled = true;
        state.lifecycle = Lifecycle::Running(run);
        true
    }

    /// Signal every task of the current run to exit and release the local
    /// port. Does not wait for the tasks.
    pub fn stop(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        state.stop_epoch = state.stop_epoch.wrapping_add(1);

        match std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped { release: None }) {
            Lifecycle::Running(run) => {
                run.shut_down();
                state.lifecycle = Lifecycle::Stopped {
                    release: Some(run.loop_task),
                };
                state.rule.enabled = false;
                info!(rule_id = %state.rule.id, "Tunnel stopped");
            }
            stopped => state.lifecycle = stopped,
        }
    }

    /// Stop and wait for the protocol loop to exit. For UDP that includes
    /// every reverse-path task.
    pub async fn stop_and_wait(&self) {
        let _transition = self.transition.lock().await;
        self.stop();

        let release = match &mut self.lock_state().lifecycle {
            Lifecycle::Stopped { release } => release.take(),
            Lifecycle::Running(_) => None,
        };
        if let Some(release) = release {
            let _ = release.await;
        }
    }

    /// Replace the stored rule. A running engine keeps relaying the old
    /// snapshot until it is stopped and started again.
    pub fn update_rule(&self, rule: Rule) -> Result<()> {
        rule.validate()?;
        let mut state = self.lock_state();
        if rule.id != state.rule.id {
            return Err(RelayError::InvalidRule(format!(
                "rule id {} cannot replace {}",
                rule.id, state.rule.id
            )));
        }
        state.rule = rule;
        Ok(())
    }

    /// Take one rate sample from the cumulative counters.
    pub fn update_rates(&self) {
        let mut state = self.lock_state();
        state
            .sampler
            .sample(self.counters.bytes_in(), self.counters.bytes_out());
    }

    pub fn get_status(&self) -> TunnelStatus {
        let latency = self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut state = self.lock_state();
        state
            .sampler
            .sample(self.counters.bytes_in(), self.counters.bytes_out());

        TunnelStatus {
            rule: state.rule.clone(),
            traffic: TrafficStats::capture(&self.counters, &state.sampler),
            latency,
            running: matches!(state.lifecycle, Lifecycle::Running(_)),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock_state().lifecycle, Lifecycle::Running(_))
    }

    pub fn rule(&self) -> Rule {
        self.lock_state().rule.clone()
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    /// Live UDP sessions, 0 for TCP rules and stopped engines.
    pub fn session_count(&self) -> usize {
        match &self.lock_state().lifecycle {
            Lifecycle::Running(Run {
                sessions: Some(sessions),
                ..
            }) => sessions.len(),
            _ => 0,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Running(run) = &state.lifecycle {
            run.shut_down();
        }
    }
}
