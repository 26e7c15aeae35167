//! Datagram endpoint: a [`Link`] with the frame codec applied.
//!
//! Sending stamps the frame's timestamp, attaches the integrity tag,
//! and emits exactly one datagram. Receiving hands back a frame only
//! when the tag verifies; a corrupted or truncated datagram is
//! indistinguishable from silence. Neither operation retries; the
//! protocol loops above drive all retry.

use std::time::Duration;

use log::trace;

use crate::clock;
use crate::core::{checksum, Frame, HEADER_SIZE};
use crate::error::Result;
use crate::link::Link;

/// Largest datagram the endpoint will read.
const MAX_DATAGRAM: usize = 65_535;

/// A duplex frame endpoint over one datagram link.
#[derive(Debug)]
pub struct Endpoint<L> {
    link: L,
}

impl<L: Link> Endpoint<L> {
    /// Wraps a link.
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// The underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Stamps `frame.time` with the current microsecond clock,
    /// attaches the integrity tag, and transmits one datagram.
    /// Returns the number of bytes handed to the link.
    pub async fn send(&self, frame: &mut Frame) -> Result<usize> {
        frame.time = clock::now();

        let mut wire = vec![0u8; frame.wire_size()];
        frame.encode_into(&mut wire);
        checksum::attach(&mut wire);

        Ok(self.link.send(&wire).await?)
    }

    /// Waits up to `timeout` (or indefinitely when `None`) for a
    /// datagram. Yields a frame only when its integrity tag verifies;
    /// timeouts and corrupted arrivals both yield `None`.
    pub async fn recv(&self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        let len = match timeout {
            None => self.link.recv(&mut buf).await?,
            Some(limit) => match tokio::time::timeout(limit, self.link.recv(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            },
        };

        let wire = &buf[..len];
        if len < HEADER_SIZE || !checksum::verify(wire) {
            trace!("dropping unverifiable datagram of {len} bytes");
            return Ok(None);
        }

        Ok(Some(Frame::decode(wire)))
    }
}
