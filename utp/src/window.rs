//! Sliding-window engine: fixed-capacity frame buffers indexed by
//! sequence offset, plus the tracker that anchors them.
//!
//! The protocol keeps three parallel windows of negotiated capacity:
//! sent frames awaiting acknowledgement, the acknowledgements received
//! for them (same indexing), and inbound frames buffered until they
//! are contiguous. Advancing a window shifts every slot left by one;
//! slot 0 is discarded and the vacated tail slot becomes reusable.

use crate::core::Frame;
use crate::error::{Error, Result};

/// True iff `seq` lands inside a window of `wsize` frames based at
/// `base`, i.e. `0 <= seq - base < wsize`.
pub fn in_window(seq: i64, base: i64, wsize: usize) -> bool {
    let idx = seq - base;
    idx >= 0 && (idx as usize) < wsize
}

/// A fixed-capacity buffer of frames indexed by `seq - base`.
#[derive(Debug)]
pub struct Window {
    slots: Vec<Frame>,
}

impl Window {
    /// Creates a window of `wsize` vacant slots, each able to hold a
    /// frame with `psize` bytes of payload.
    pub fn new(wsize: usize, psize: usize) -> Self {
        Self {
            slots: (0..wsize).map(|_| Frame::vacant(psize)).collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// View of slot `i`.
    pub fn slot(&self, i: usize) -> &Frame {
        &self.slots[i]
    }

    /// Mutable view of slot `i`, used to refresh retransmissions.
    pub fn slot_mut(&mut self, i: usize) -> &mut Frame {
        &mut self.slots[i]
    }

    /// Copies `frame` into the slot addressed by its sequence number
    /// relative to `base`. Rejects sequences outside the window, so
    /// the occupancy invariant cannot be violated by an insert.
    pub fn insert(&mut self, frame: &Frame, base: i64) -> Result<()> {
        if !in_window(frame.seq, base, self.slots.len()) {
            return Err(Error::SequenceOutOfRange);
        }
        let idx = (frame.seq - base) as usize;
        self.slots[idx].clone_from(frame);
        Ok(())
    }

    /// Shifts all slots left by one frame; slot 0 is discarded and
    /// the tail slot becomes vacant.
    pub fn slide(&mut self) {
        self.slots.rotate_left(1);
        if let Some(tail) = self.slots.last_mut() {
            tail.reset();
        }
    }
}

/// Sequence counters anchoring the send and receive windows.
///
/// `send_next` and `recv_next` are the window bases; `send_last` and
/// `recv_last` track the highest sequence placed in each window. When
/// a side has nothing outstanding, its `last` counter sits one below
/// its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracker {
    /// Oldest un-ACKed outbound sequence (send window base).
    pub send_next: i64,

    /// Highest sequence placed in the send window.
    pub send_last: i64,

    /// Next expected inbound sequence (receive window base).
    pub recv_next: i64,

    /// Highest inbound sequence observed.
    pub recv_last: i64,
}

impl Tracker {
    /// Anchors the windows right after a completed handshake:
    /// `seq_send` is the next unassigned local sequence and `seq_recv`
    /// the peer's final handshake sequence.
    pub fn new(seq_send: i64, seq_recv: i64) -> Self {
        Self {
            send_next: seq_send,
            send_last: seq_send - 1,
            recv_next: seq_recv + 1,
            recv_last: seq_recv,
        }
    }

    /// Outbound frames currently awaiting acknowledgement.
    pub fn outstanding(&self) -> i64 {
        self.send_last - self.send_next + 1
    }
}
