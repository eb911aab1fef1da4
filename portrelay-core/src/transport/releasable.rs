//! Bound sockets the engine can close while a relay task is polling them.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use tokio::io::ReadBuf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Shared handle to a bound socket.
///
/// Relay tasks poll through the handle instead of owning the socket, so
/// [`ReleasableSocket::close`] drops it on the spot and the port is free as
/// soon as `close` returns. Every operation after that fails with
/// `NotConnected`.
pub struct ReleasableSocket<S> {
    inner: Arc<Mutex<Option<S>>>,
}

impl<S> Clone for ReleasableSocket<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket released")
}

impl<S> ReleasableSocket<S> {
    pub fn new(socket: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(socket))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the socket. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let socket = self.lock().take();
        socket.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn poll_with<T>(&self, f: impl FnOnce(&S) -> Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        match self.lock().as_ref() {
            Some(socket) => f(socket),
            None => Poll::Ready(Err(closed_error())),
        }
    }
}

impl ReleasableSocket<TcpListener> {
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        poll_fn(|cx| self.poll_with(|listener| listener.poll_accept(cx))).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.lock()
            .as_ref()
            .map_or_else(|| Err(closed_error()), TcpListener::local_addr)
    }
}

impl ReleasableSocket<UdpSocket> {
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        poll_fn(|cx| {
            let mut read = ReadBuf::new(&mut *buf);
            match self.poll_with(|socket| socket.poll_recv_from(cx, &mut read)) {
                Poll::Ready(Ok(addr)) => Poll::Ready(Ok((read.filled().len(), addr))),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Pending,
            }
        })
        .await
    }

    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        poll_fn(|cx| self.poll_with(|socket| socket.poll_send_to(cx, buf, target))).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.lock()
            .as_ref()
            .map_or_else(|| Err(closed_error()), UdpSocket::local_addr)
    }
}
