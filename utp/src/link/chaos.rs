//! Send-side fault injection.
//!
//! Wraps any [`Link`] and, with a configured percentage, either
//! corrupts one byte of an outgoing datagram's integrity tag or
//! swallows the datagram entirely. Corruption exercises the receiver's
//! checksum-and-resend path, loss exercises the NAK request path.
//! This is a simulation harness around the link, never protocol
//! behavior.

use std::future::Future;
use std::io;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::frame::TAG_RANGE;

use super::Link;

enum Verdict {
    Deliver,
    Corrupt,
    Swallow,
}

/// A link wrapper that randomly corrupts or drops outgoing datagrams.
#[derive(Debug)]
pub struct ChaosLink<L> {
    inner: L,
    percent: u8,
    rng: Mutex<StdRng>,
}

impl<L> ChaosLink<L> {
    /// Wraps `inner` with a `percent` chance (clamped to 99) of
    /// mangling each outgoing datagram. Zero leaves the link clean.
    pub fn new(inner: L, percent: u8) -> Self {
        Self {
            inner,
            percent: percent.min(99),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// The wrapped link.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn roll(&self, len: usize) -> Verdict {
        if self.percent == 0 {
            return Verdict::Deliver;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        if rng.gen_range(0..100u8) >= self.percent {
            return Verdict::Deliver;
        }
        // Datagrams too short to carry a tag can only be dropped.
        if rng.gen_bool(0.5) && len > TAG_RANGE.end {
            Verdict::Corrupt
        } else {
            Verdict::Swallow
        }
    }
}

impl<L: Link> Link for ChaosLink<L> {
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let verdict = self.roll(datagram.len());
            match verdict {
                Verdict::Deliver => self.inner.send(datagram).await,
                Verdict::Corrupt => {
                    let mut mangled = datagram.to_vec();
                    let (index, delta) = {
                        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                        (rng.gen_range(TAG_RANGE), rng.gen_range(1..=9u8))
                    };
                    if let Some(byte) = mangled.get_mut(index) {
                        *byte = byte.wrapping_add(delta);
                    }
                    self.inner.send(&mangled).await
                }
                Verdict::Swallow => Ok(0),
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        self.inner.recv(buf)
    }
}
