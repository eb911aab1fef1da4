//! UDP session multiplexer.
//!
//! One shared socket receives every client datagram. Each distinct client
//! address gets its own outbound socket connected to the target, plus a
//! reverse-path task that copies target replies back to that client. A
//! session is evicted after `udp_idle_timeout` without target-side traffic.
//!
//! Client -> target bytes count as [`Direction::Out`], target -> client bytes
//! as [`Direction::In`], matching the TCP relay.

pub mod session;

pub use session::{SessionStore, UdpSession, UdpSessionTable};

use crate::rule::Protocol;
use crate::stats::{Direction, TrafficCounters};
use crate::transport::{self, ReleasableSocket};
use portrelay_common::{EngineConfig, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct UdpRelay {
    pub rule_id: Arc<str>,
    pub target: Arc<str>,
    pub config: Arc<EngineConfig>,
    pub counters: Arc<TrafficCounters>,
    pub sessions: Arc<UdpSessionTable>,
}

/// Receive on `socket` until `cancel` fires or the socket is released.
///
/// On return the shared socket is closed, every session has been cancelled
/// and its reverse task awaited.
pub(crate) async fn run_udp_loop(
    socket: ReleasableSocket<UdpSocket>,
    relay: UdpRelay,
    cancel: CancellationToken,
) {
    info!(
        rule_id = %relay.rule_id,
        addr = ?socket.local_addr().ok(),
        target = %relay.target,
        "UDP relay listening"
    );

    let mut buf = vec![0u8; relay.config.udp_buffer_size];
    let mut reverse_paths = JoinSet::new();

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(_) = reverse_paths.join_next(), if !reverse_paths.is_empty() => continue,
            received = tokio::time::timeout(relay.config.udp_recv_poll, socket.recv_from(&mut buf)) => received,
        };

        let (n, client_addr) = match received {
            Ok(Ok(received)) => received,
            Ok(Err(_)) if socket.is_closed() => break,
            Ok(Err(e)) => {
                debug!(rule_id = %relay.rule_id, error = %e, "UDP receive failed");
                continue;
            }
            // Poll deadline, only there to re-check cancellation.
            Err(_) => continue,
        };

        relay.counters.record(Direction::Out, n);
        crate::telemetry::bytes(Protocol::Udp, Direction::Out, n);

        let session = match relay.sessions.get(&client_addr) {
            Some((_, session)) => session,
            None => match open_session(&socket, client_addr, &relay, &cancel, &mut reverse_paths)
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    debug!(
                        rule_id = %relay.rule_id,
                        client = %client_addr,
                        error = %e,
                        "Dropping datagram, target unreachable"
                    );
                    continue;
                }
            },
        };

        if let Err(e) = session.outbound.send(&buf[..n]).await {
            debug!(
                rule_id = %relay.rule_id,
                client = %client_addr,
                error = %e,
                "UDP forward to target failed"
            );
        }
    }

    socket.close();
    let dropped = relay.sessions.clear();
    while reverse_paths.join_next().await.is_some() {}
    debug!(rule_id = %relay.rule_id, sessions = dropped, "UDP relay stopped");
}

async fn open_session(
    inbound: &ReleasableSocket<UdpSocket>,
    client_addr: SocketAddr,
    relay: &UdpRelay,
    cancel: &CancellationToken,
    reverse_paths: &mut JoinSet<()>,
) -> Result<Arc<UdpSession>> {
    let outbound = transport::connect_udp(&relay.target).await?;
    let session = Arc::new(UdpSession::new(client_addr, outbound, cancel.child_token()));
    let generation = relay.sessions.insert(client_addr, session.clone());

    debug!(
        rule_id = %relay.rule_id,
        client = %client_addr,
        sessions = relay.sessions.len(),
        "UDP session opened"
    );

    reverse_paths.spawn(run_reverse_path(
        inbound.clone(),
        session.clone(),
        generation,
        relay.clone(),
    ));
    Ok(session)
}

async fn run_reverse_path(
    inbound: ReleasableSocket<UdpSocket>,
    session: Arc<UdpSession>,
    generation: u64,
    relay: UdpRelay,
) {
    let mut buf = vec![0u8; relay.config.udp_buffer_size];

    loop {
        let received = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break,
            received = tokio::time::timeout(relay.config.udp_idle_timeout, session.outbound.recv(&mut buf)) => received,
        };

        match received {
            Ok(Ok(n)) => {
                relay.counters.record(Direction::In, n);
                crate::telemetry::bytes(Protocol::Udp, Direction::In, n);
                if let Err(e) = inbound.send_to(&buf[..n], session.client_addr).await {
                    debug!(
                        rule_id = %relay.rule_id,
                        client = %session.client_addr,
                        error = %e,
                        "UDP reply to client failed"
                    );
                }
            }
            Ok(Err(e)) => {
                debug!(
                    rule_id = %relay.rule_id,
                    client = %session.client_addr,
                    error = %e,
                    "UDP receive from target failed"
                );
            }
            Err(_) => {
                relay.sessions.evict(&session.client_addr, generation);
                debug!(
                    rule_id = %relay.rule_id,
                    client = %session.client_addr,
                    sessions = relay.sessions.len(),
                    "UDP session idle, evicted"
                );
                break;
            }
        }
    }
}
