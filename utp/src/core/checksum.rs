//! MD5 integrity tag over the full wire image.
//!
//! The tag covers every byte of the frame, header and payload alike,
//! with the tag field itself zeroed during computation. Verification
//! recomputes the digest the same way and compares; a mismatch is
//! reported as a boolean so receive paths can treat a corrupted
//! datagram as if nothing arrived.

use super::frame::TAG_RANGE;

/// Computes the digest of a wire image with the tag region zeroed.
fn digest(wire: &[u8]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume(&wire[..TAG_RANGE.start]);
    ctx.consume([0u8; 16]);
    ctx.consume(&wire[TAG_RANGE.end..]);
    ctx.compute().0
}

/// Computes the tag and writes it into the wire image.
pub fn attach(wire: &mut [u8]) {
    let tag = digest(wire);
    wire[TAG_RANGE].copy_from_slice(&tag);
}

/// True iff the tag in the wire image matches a fresh computation.
pub fn verify(wire: &[u8]) -> bool {
    wire[TAG_RANGE] == digest(wire)
}
