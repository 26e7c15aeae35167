//! Frame definition and serialization.
//!
//! A frame is the unit of transmission: one frame travels in exactly
//! one UDP datagram. Every post-handshake frame of a connection has
//! the same total size, `HEADER_SIZE` plus the negotiated payload
//! capacity; handshake frames use a fixed 16-byte payload instead.
//!
//! # Wire format (little-endian)
//!
//! ```text
//! offset  size  field
//! ------  ----  -----------------------------------------
//!      0     2  size   payload bytes actually used (i16)
//!      2     8  seq    sequence number (i64)
//!     10     8  time   send timestamp, microseconds (i64)
//!     18     1  flags  type nibble plus modifier bits
//!     19    16  md5    integrity tag, computed with this
//!                      field zeroed
//!     35     N  msg    payload region, unused tail zeroed
//! ```

use std::fmt;
use std::ops::BitOr;

/// Size of the fixed frame header, up to and including the tag.
pub const HEADER_SIZE: usize = 35;

/// Byte range of the integrity tag within the wire image.
pub const TAG_RANGE: std::ops::Range<usize> = 19..35;

/// Frame flags: a type in the low nibble plus modifier bits.
///
/// The low four bits select exactly one type; the high bits carry
/// orthogonal modifiers. Handshake and teardown transitions compare
/// the whole byte, so `SYN | ACK` is distinct from either part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// Data message (type).
    pub const MSG: Flags = Flags(0);

    /// Negative acknowledgement (type).
    pub const NAK: Flags = Flags(1);

    /// Acknowledgement (type).
    pub const ACK: Flags = Flags(2);

    /// Connection request (type).
    pub const SYN: Flags = Flags(4);

    /// Teardown request (type).
    pub const FIN: Flags = Flags(8);

    /// Last frame of an application message (modifier).
    pub const END: Flags = Flags(16);

    /// NAK carries a positive "please send" request (modifier).
    pub const REQ: Flags = Flags(32);

    /// This frame is a retransmission (modifier).
    pub const RES: Flags = Flags(64);

    /// Creates flags from a raw byte.
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Returns the raw byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// The type portion: the low nibble with all modifiers stripped.
    pub const fn kind(self) -> Flags {
        Flags(self.0 & 0x0F)
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Combines two flag sets.
    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        self.union(rhs)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 7] = [
            (Flags::SYN, "SYN"),
            (Flags::ACK, "ACK"),
            (Flags::FIN, "FIN"),
            (Flags::NAK, "NAK"),
            (Flags::END, "END"),
            (Flags::REQ, "REQ"),
            (Flags::RES, "RES"),
        ];

        let mut first = true;
        if self.kind() == Flags::MSG {
            f.write_str("MSG")?;
            first = false;
        }
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Frame type selected by the low nibble of the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Data message.
    Msg,

    /// Negative acknowledgement.
    Nak,

    /// Acknowledgement.
    Ack,

    /// Connection request.
    Syn,

    /// Teardown request.
    Fin,
}

impl FrameKind {
    /// Extracts the type from a raw flags byte, ignoring modifier
    /// bits. Combined type nibbles (handshake composites like
    /// SYN|ACK) have no single kind.
    pub const fn from_bits(bits: u8) -> Option<FrameKind> {
        match bits & 0x0F {
            0 => Some(FrameKind::Msg),
            1 => Some(FrameKind::Nak),
            2 => Some(FrameKind::Ack),
            4 => Some(FrameKind::Syn),
            8 => Some(FrameKind::Fin),
            _ => None,
        }
    }
}

/// A protocol frame with an owned payload region.
///
/// The payload vector is allocated at the frame's full capacity (the
/// negotiated payload size, or [`crate::config::HANDSHAKE_PAYLOAD`]
/// during setup); `size` records how much of it is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Used payload bytes.
    pub size: i16,

    /// Sequence number assigned by the sender.
    pub seq: i64,

    /// Send timestamp in microseconds; re-stamped with the local
    /// clock on arrival.
    pub time: i64,

    /// Type and modifier bits.
    pub flags: Flags,

    /// Integrity tag as received; maintained by the endpoint.
    pub md5: [u8; 16],

    /// Payload region, always `capacity` bytes long.
    pub msg: Vec<u8>,
}

impl Frame {
    /// Creates an empty frame with the given payload capacity.
    ///
    /// The sequence is a sentinel that can never collide with a real
    /// one, so vacant window slots are distinguishable from frames.
    pub fn vacant(capacity: usize) -> Self {
        Self {
            size: 0,
            seq: -1,
            time: 0,
            flags: Flags::default(),
            md5: [0u8; 16],
            msg: vec![0u8; capacity],
        }
    }

    /// Payload capacity of this frame.
    pub fn capacity(&self) -> usize {
        self.msg.len()
    }

    /// The frame's type, when the low nibble is a single known type.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_bits(self.flags.bits())
    }

    /// Returns the frame to the vacant state, keeping its capacity.
    pub fn reset(&mut self) {
        self.size = 0;
        self.seq = -1;
        self.time = 0;
        self.flags = Flags::default();
        self.md5 = [0u8; 16];
        self.msg.fill(0);
    }

    /// Total size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.msg.len()
    }

    /// Prepares a payload-less frame such as an ACK, NAK, or FIN, and
    /// doubles as the general reset: header fields are overwritten and
    /// the whole payload region is zeroed.
    pub fn set_properties(&mut self, size: i16, seq: i64, flags: Flags) {
        self.size = size;
        self.seq = seq;
        self.flags = flags;
        self.msg.fill(0);
    }

    /// Prepares a handshake offer. The proposed payload size rides in
    /// the `size` field and the proposed window size as decimal ASCII
    /// in the payload, so negotiation fits the ordinary frame layout.
    pub fn set_handshake(&mut self, seq: i64, flags: Flags, psize: i16, wsize: i16) {
        self.set_properties(psize, seq, flags);
        let digits = wsize.to_string();
        let len = digits.len().min(self.msg.len());
        self.msg[..len].copy_from_slice(&digits.as_bytes()[..len]);
    }

    /// Reads a handshake offer back out: `(psize, wsize)`.
    ///
    /// A payload that does not parse as a decimal number yields a
    /// window proposal of 0, which negotiation ignores.
    pub fn handshake_proposal(&self) -> (i16, i16) {
        let end = self.msg.iter().position(|&b| b == 0).unwrap_or(self.msg.len());
        let wsize = std::str::from_utf8(&self.msg[..end])
            .ok()
            .and_then(|s| s.parse::<i16>().ok())
            .unwrap_or(0);
        (self.size, wsize)
    }

    /// Prepares a data frame from the front of `stream`, copying at
    /// most one payload's worth of bytes.
    ///
    /// When the copy consumes the entire remaining stream the END
    /// modifier is added; otherwise all modifiers are stripped so that
    /// only the type survives on intermediate segments. Returns the
    /// number of bytes consumed.
    pub fn set_message(&mut self, stream: &[u8], seq: i64, flags: Flags) -> usize {
        let overflow = stream.len() > self.msg.len();
        let copied = stream.len().min(self.msg.len());
        let flags = if overflow { flags.kind() } else { flags | Flags::END };

        self.set_properties(copied as i16, seq, flags);
        self.msg[..copied].copy_from_slice(&stream[..copied]);
        copied
    }

    /// The meaningful portion of the payload.
    pub fn payload(&self) -> &[u8] {
        let used = (self.size.max(0) as usize).min(self.msg.len());
        &self.msg[..used]
    }

    /// Serializes the frame into `out`, which must hold exactly
    /// [`Frame::wire_size`] bytes. The tag field is written as zeros;
    /// the endpoint computes and attaches the real tag afterwards.
    pub fn encode_into(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.wire_size());

        out[0..2].copy_from_slice(&self.size.to_le_bytes());
        out[2..10].copy_from_slice(&self.seq.to_le_bytes());
        out[10..18].copy_from_slice(&self.time.to_le_bytes());
        out[18] = self.flags.bits();
        out[TAG_RANGE].fill(0);
        out[HEADER_SIZE..].copy_from_slice(&self.msg);
    }

    /// Deserializes a frame from a wire image of at least
    /// [`HEADER_SIZE`] bytes; everything past the header becomes the
    /// payload region.
    pub fn decode(wire: &[u8]) -> Self {
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&wire[TAG_RANGE]);

        Self {
            size: i16::from_le_bytes([wire[0], wire[1]]),
            seq: read_i64(wire, 2),
            time: read_i64(wire, 10),
            flags: Flags::from_bits(wire[18]),
            md5,
            msg: wire[HEADER_SIZE..].to_vec(),
        }
    }
}

fn read_i64(wire: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&wire[at..at + 8]);
    i64::from_le_bytes(bytes)
}
