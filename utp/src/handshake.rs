//! Connection establishment.
//!
//! Three-way exchange: SYN carrying the initiator's window and
//! payload proposals, SYN|ACK carrying the listener's, then a final
//! ACK. Each side adopts the minimum of the two proposals, so both
//! run with identical parameters afterwards. Handshake frames always
//! use the fixed 16-byte payload; transitions match the flags byte
//! exactly, so reordered or duplicated setup frames cannot advance
//! the state machine by accident.
//!
//! Every attempt consumes one send sequence number, which is how the
//! peers end up knowing each other's initial sequences: the last
//! handshake frame a side receives anchors its receive window.

use log::{debug, info};

use crate::clock;
use crate::config::{Config, Negotiated, HANDSHAKE_PAYLOAD};
use crate::core::{Flags, Frame};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::link::Link;

/// Outcome of a completed handshake.
#[derive(Debug, Clone, Copy)]
pub struct Opened {
    /// Parameters both sides agreed on.
    pub negotiated: Negotiated,

    /// Next unassigned local send sequence.
    pub seq_send: i64,

    /// The peer's final handshake sequence; the receive window is
    /// anchored one past it.
    pub seq_recv: i64,
}

/// Waits for a connection as the listening side.
///
/// Blocks until a SYN arrives, answers with SYN|ACK offers until the
/// initiator's final ACK, and returns the negotiated session anchors.
pub async fn listen<L: Link>(endpoint: &Endpoint<L>, config: &Config) -> Result<Opened> {
    let timeout = Some(config.timeout());
    let mut seq_send = clock::now();

    let syn = loop {
        if let Some(frame) = endpoint.recv(timeout).await? {
            if frame.flags == Flags::SYN {
                break frame;
            }
        }
    };

    let (peer_psize, peer_wsize) = syn.handshake_proposal();
    let negotiated = config.negotiate(peer_wsize, peer_psize);
    info!(
        "SYN received, negotiated window {} frames, payload {} bytes",
        negotiated.wsize, negotiated.psize
    );

    let mut offer = Frame::vacant(HANDSHAKE_PAYLOAD);
    let ack = loop {
        offer.set_handshake(
            seq_send,
            Flags::SYN | Flags::ACK,
            negotiated.psize as i16,
            negotiated.wsize as i16,
        );
        seq_send += 1;
        endpoint.send(&mut offer).await?;

        if let Some(frame) = endpoint.recv(timeout).await? {
            if frame.flags == Flags::ACK {
                break frame;
            }
        }
    };
    debug!("final ACK received, peer initial sequence {}", ack.seq);

    Ok(Opened { negotiated, seq_send, seq_recv: ack.seq })
}

/// Opens a connection as the initiating side.
///
/// Sends SYN offers until the listener's SYN|ACK arrives, adopts the
/// negotiated parameters, then acknowledges until the listener goes
/// quiet or stops repeating SYN|ACK.
pub async fn connect<L: Link>(endpoint: &Endpoint<L>, config: &Config) -> Result<Opened> {
    let timeout = Some(config.timeout());
    let mut seq_send = clock::now();
    let mut offer = Frame::vacant(HANDSHAKE_PAYLOAD);

    let synack = loop {
        offer.set_handshake(seq_send, Flags::SYN, config.psize, config.wsize);
        seq_send += 1;
        endpoint.send(&mut offer).await?;

        if let Some(frame) = endpoint.recv(timeout).await? {
            if frame.flags == Flags::SYN | Flags::ACK {
                break frame;
            }
        }
    };

    let (peer_psize, peer_wsize) = synack.handshake_proposal();
    let negotiated = config.negotiate(peer_wsize, peer_psize);
    info!(
        "SYN|ACK received, negotiated window {} frames, payload {} bytes",
        negotiated.wsize, negotiated.psize
    );

    let mut seq_recv = synack.seq;
    loop {
        offer.set_handshake(
            seq_send,
            Flags::ACK,
            negotiated.psize as i16,
            negotiated.wsize as i16,
        );
        seq_send += 1;
        endpoint.send(&mut offer).await?;

        match endpoint.recv(timeout).await? {
            Some(frame) if frame.flags.contains(Flags::SYN | Flags::ACK) => {
                seq_recv = frame.seq;
            }
            _ => break,
        }
    }
    debug!("handshake complete, peer initial sequence {seq_recv}");

    Ok(Opened { negotiated, seq_send, seq_recv })
}
