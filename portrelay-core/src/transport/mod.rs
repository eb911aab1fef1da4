//! Socket setup for engine listeners and target connections

pub mod releasable;
pub mod socket_tuning;

use portrelay_common::{RelayError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

pub use releasable::ReleasableSocket;
pub use socket_tuning::{configure_socket, configure_socket_silent};

const LISTEN_BACKLOG: i32 = 1024;

/// Bind a TCP listener on `addr`.
///
/// `SO_REUSEADDR` is set on Unix so that a port released by a stopped engine
/// can be bound again while its old connections sit in `TIME_WAIT`.
pub fn bind_tcp_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_err = |source| RelayError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    #[cfg(unix)]
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

/// Bind the shared inbound UDP socket of an engine.
pub async fn bind_udp_socket(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { addr, source })
}

/// Dial `target` with a connect timeout and tune the resulting stream.
pub async fn connect_tcp(target: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(target))
        .await
        .map_err(|_| RelayError::Timeout(format!("connect to {target}")))?
        .map_err(|e| RelayError::Dial {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
    configure_socket_silent(&stream);
    Ok(stream)
}

/// Open an outbound UDP socket connected to `target`.
pub async fn connect_udp(target: &str) -> Result<UdpSocket> {
    let dial_err = |e: std::io::Error| RelayError::Dial {
        target: target.to_string(),
        reason: e.to_string(),
    };

    let resolved = tokio::net::lookup_host(target)
        .await
        .map_err(dial_err)?
        .next()
        .ok_or_else(|| RelayError::Dial {
            target: target.to_string(),
            reason: "no address resolved".into(),
        })?;

    let bind_addr: SocketAddr = match resolved {
        SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let socket = UdpSocket::bind(bind_addr).await.map_err(dial_err)?;
    socket.connect(resolved).await.map_err(dial_err)?;
    Ok(socket)
}
