//! Datagram link abstraction.
//!
//! A [`Link`] moves whole datagrams between two peers and nothing
//! more: unordered, lossy, uninterpreted. The protocol's reliability
//! machinery lives entirely above it.
//!
//! # Implementations
//!
//! - [`UdpLink`]: a UDP socket bound to one remote peer
//! - [`ChaosLink`]: send-side fault injection around any link
//! - [`MemoryLink`]: in-process queue pair for tests

mod chaos;
mod memory;

pub use chaos::ChaosLink;
pub use memory::MemoryLink;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::UdpSocket;

/// One unreliable datagram in, one out.
///
/// Neither operation retries or interprets the payload; delivery,
/// ordering, and integrity are the caller's problem.
pub trait Link: Send + Sync + 'static {
    /// Transmits exactly one datagram to the remote peer.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Waits for one datagram and copies it into `buf`, returning its
    /// length.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// A UDP socket paired with one remote address.
///
/// A listening link starts without a remote; the source address of the
/// first datagram received is pinned as the peer for the rest of the
/// connection. A connecting link knows its peer from the start.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    remote: OnceLock<SocketAddr>,
}

impl UdpLink {
    /// Binds a listening link on the given local port.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(Self { socket, remote: OnceLock::new() })
    }

    /// Creates a connecting link toward `remote` from an ephemeral
    /// local port.
    pub async fn connect(remote: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let pinned = OnceLock::new();
        let _ = pinned.set(remote);
        Ok(Self { socket, remote: pinned })
    }

    /// The local socket address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The peer address, once known.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote.get().copied()
    }
}

impl Link for UdpLink {
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            match self.remote.get() {
                Some(addr) => self.socket.send_to(datagram, *addr).await,
                None => Err(io::ErrorKind::NotConnected.into()),
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let (len, addr) = self.socket.recv_from(buf).await?;
            let _ = self.remote.set(addr);
            Ok(len)
        }
    }
}
