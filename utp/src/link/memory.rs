//! In-process datagram pair for tests.
//!
//! Two queue-backed links wired back to back, the unordered-medium
//! analogue of a loopback transport. A vanished peer behaves like a
//! dead network: sends are silently discarded and receives wait
//! forever, so timeout paths exercise exactly as they would on a
//! socket.

use std::future::Future;
use std::io;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::Link;

/// One side of an in-memory datagram pair.
#[derive(Debug)]
pub struct MemoryLink {
    tx: UnboundedSender<Vec<u8>>,
    rx: Mutex<UnboundedReceiver<Vec<u8>>>,
}

impl MemoryLink {
    /// Creates two links connected to each other.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            MemoryLink { tx: a_tx, rx: Mutex::new(a_rx) },
            MemoryLink { tx: b_tx, rx: Mutex::new(b_rx) },
        )
    }
}

impl Link for MemoryLink {
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<usize>> + Send {
        // A closed peer swallows datagrams, like UDP does.
        let _ = self.tx.send(datagram.to_vec());
        let len = datagram.len();
        async move { Ok(len) }
    }

    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let datagram = self.rx.lock().await.recv().await;
            match datagram {
                Some(datagram) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    Ok(len)
                }
                None => std::future::pending().await,
            }
        }
    }
}
