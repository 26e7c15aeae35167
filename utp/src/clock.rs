//! Monotonic microsecond clock and per-frame timeout predicate.
//!
//! All timestamps in the protocol are microseconds since an arbitrary
//! process-local epoch. Frames are re-stamped on arrival, so expiry
//! comparisons never mix the two peers' clocks.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current time in microseconds since the process epoch.
pub fn now() -> i64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as i64
}

/// True once more than `timeout_us` microseconds have elapsed since
/// `stamp` was taken.
pub fn expired(stamp: i64, timeout_us: i64) -> bool {
    stamp + timeout_us < now()
}
