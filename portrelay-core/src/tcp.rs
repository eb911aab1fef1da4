//! TCP relay: accept loop plus one bidirectional copy per connection.
//!
//! Cancellation is observed between iterations, never by preempting a
//! blocked read. A copy stuck in a read exits when its `io_timeout` lapses,
//! so shutdown of live connections is bounded by that timeout.

use crate::rule::Protocol;
use crate::stats::{ConnectionGuard, Direction, TrafficCounters};
use crate::transport;
use portrelay_common::EngineConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::transport::ReleasableSocket;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a connection handler needs, cloned once per accepted socket.
#[derive(Clone)]
pub(crate) struct TcpRelay {
    pub rule_id: Arc<str>,
    pub target: Arc<str>,
    pub config: Arc<EngineConfig>,
    pub counters: Arc<TrafficCounters>,
}

/// Accept until `cancel` fires or the listener is released. The listener is
/// closed on return.
pub(crate) async fn run_accept_loop(
    listener: ReleasableSocket<TcpListener>,
    relay: TcpRelay,
    cancel: CancellationToken,
) {
    info!(
        rule_id = %relay.rule_id,
        addr = ?listener.local_addr().ok(),
        target = %relay.target,
        "TCP relay listening"
    );

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                let guard = ConnectionGuard::new(relay.counters.clone());
                let relay = relay.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    handle_connection(stream, peer_addr, relay, cancel).await;
                });
            }
            Err(_) if listener.is_closed() => break,
            Err(e) => {
                warn!(rule_id = %relay.rule_id, error = %e, "TCP accept failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    listener.close();
    debug!(rule_id = %relay.rule_id, "TCP accept loop stopped");
}

async fn handle_connection(
    client: TcpStream,
    peer_addr: SocketAddr,
    relay: TcpRelay,
    cancel: CancellationToken,
) {
    transport::configure_socket_silent(&client);

    let upstream = match transport::connect_tcp(&relay.target, relay.config.dial_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(
                rule_id = %relay.rule_id,
                peer_addr = %peer_addr,
                error = %e,
                "Dropping connection, target unreachable"
            );
            return;
        }
    };

    let start = Instant::now();
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let (sent, received) = tokio::join!(
        copy_with_stats(
            client_read,
            upstream_write,
            Direction::Out,
            &relay.counters,
            &relay.config,
            &cancel,
        ),
        copy_with_stats(
            upstream_read,
            client_write,
            Direction::In,
            &relay.counters,
            &relay.config,
            &cancel,
        ),
    );

    debug!(
        rule_id = %relay.rule_id,
        peer_addr = %peer_addr,
        duration_ms = start.elapsed().as_millis(),
        bytes_out = sent,
        bytes_in = received,
        "TCP connection closed"
    );
}

/// Copy `src` into `dst` until EOF, error, timeout or cancellation.
///
/// Bytes are counted after the read and before the write, so a failed write
/// still shows up in the totals. Returns the number of bytes read.
pub(crate) async fn copy_with_stats<R, W>(
    mut src: R,
    mut dst: W,
    direction: Direction,
    counters: &TrafficCounters,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.copy_buffer_size];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let n = match tokio::time::timeout(config.io_timeout, src.read(&mut buf)).await {
            Ok(Ok(0)) => {
                let _ = dst.shutdown().await;
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(direction = direction.as_str(), error = %e, "Relay read failed");
                break;
            }
            Err(_) => {
                debug!(direction = direction.as_str(), "Relay read timed out");
                break;
            }
        };

        counters.record(direction, n);
        crate::telemetry::bytes(Protocol::Tcp, direction, n);
        total += n as u64;

        match tokio::time::timeout(config.io_timeout, dst.write_all(&buf[..n])).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(direction = direction.as_str(), error = %e, "Relay write failed");
                break;
            }
            Err(_) => {
                debug!(direction = direction.as_str(), "Relay write timed out");
                break;
            }
        }
    }

    total
}
