//! Protocol parameters and handshake negotiation.

use std::time::Duration;

/// Default UDP port for the listener.
pub const DEFAULT_PORT: u16 = 5555;

/// Default window size proposal, in frames.
pub const DEFAULT_WINDOW: i16 = 16;

/// Default payload size proposal, in bytes.
pub const DEFAULT_PAYLOAD: i16 = 32;

/// Default retransmit timeout in microseconds.
pub const DEFAULT_TIMEOUT_US: i64 = 60_000;

/// Fixed payload capacity of handshake frames, independent of the
/// negotiated payload size.
pub const HANDSHAKE_PAYLOAD: usize = 16;

/// Unsuccessful rounds allowed before a teardown loop gives up.
pub const TEARDOWN_MAX: u32 = 16;

/// Sleep period of the resend and request loops.
pub const LOOP_TICK: Duration = Duration::from_millis(20);

/// Local proposal for a connection: what this side offers during the
/// handshake, plus the shared retransmit timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Proposed window size, in frames.
    pub wsize: i16,

    /// Proposed payload size, in bytes.
    pub psize: i16,

    /// Retransmit timeout in microseconds, applied per frame and
    /// reused by the handshake and teardown retry loops.
    pub timeout_us: i64,
}

impl Config {
    /// The retransmit timeout as a [`Duration`], for bounded receives.
    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.timeout_us.max(0) as u64)
    }

    /// Merges this side's proposal with the peer's into the parameters
    /// both sides run with. Each dimension adopts the minimum of the
    /// two proposals; a degenerate peer value (below 2) is ignored.
    pub fn negotiate(&self, peer_wsize: i16, peer_psize: i16) -> Negotiated {
        Negotiated {
            wsize: pick(self.wsize, peer_wsize) as usize,
            psize: pick(self.psize, peer_psize) as usize,
            timeout_us: self.timeout_us,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wsize: DEFAULT_WINDOW,
            psize: DEFAULT_PAYLOAD,
            timeout_us: DEFAULT_TIMEOUT_US,
        }
    }
}

fn pick(local: i16, peer: i16) -> i16 {
    let min = local.min(peer);
    if min > 1 { min } else { local }
}

/// Parameters shared by both peers after a completed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Window size in frames, identical in both directions.
    pub wsize: usize,

    /// Payload capacity of every post-handshake frame.
    pub psize: usize,

    /// Retransmit timeout in microseconds.
    pub timeout_us: i64,
}

impl Negotiated {
    /// The retransmit timeout as a [`Duration`], for bounded receives.
    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.timeout_us.max(0) as u64)
    }
}
