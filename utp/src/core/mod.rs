//! Frame layout and integrity primitives.

pub mod checksum;
pub mod frame;

pub use frame::{Flags, Frame, FrameKind, HEADER_SIZE};
