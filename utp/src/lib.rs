//! Reliable peer-to-peer messaging over UDP.
//!
//! The transport turns an unordered, lossy datagram link into a
//! bidirectional, in-order, exactly-once message stream:
//!
//! - every frame carries an MD5 integrity tag; corrupted arrivals are
//!   indistinguishable from loss,
//! - a three-way handshake negotiates window and payload sizes down
//!   to the smaller of the two peers' proposals,
//! - a sliding-window selective-repeat engine retransmits on sender
//!   timeout and requests gaps with receiver NAKs,
//! - a symmetric three-way teardown closes with a bounded retry
//!   budget.
//!
//! # Example
//!
//! ```rust,no_run
//! use utp::{handshake, Config, Endpoint, Input, Protocol, UdpLink};
//!
//! # async fn listener() -> utp::Result<()> {
//! let link = UdpLink::bind(5555).await?;
//! let endpoint = Endpoint::new(link);
//! let opened = handshake::listen(&endpoint, &Config::default()).await?;
//!
//! let (protocol, io) = Protocol::new(endpoint, opened);
//! io.input.send(Input::Message(b"hello".to_vec())).ok();
//! let closed = protocol.run().await?;
//! # let _ = closed;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod link;
pub mod protocol;
pub mod teardown;
pub mod window;

mod session;

pub use config::{Config, Negotiated};
pub use crate::core::{Flags, Frame, FrameKind};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use handshake::Opened;
pub use link::{ChaosLink, Link, MemoryLink, UdpLink};
pub use protocol::{Closed, Input, Protocol, ProtocolIo};
