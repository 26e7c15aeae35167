//! Graceful connection teardown.
//!
//! Symmetric three-way close: FIN from the side that wants out,
//! FIN|ACK from the other, a final ACK back. Both directions run on a
//! bounded retry budget; a close that exhausts it is reported as
//! timed out rather than looping forever against a vanished peer.

use log::debug;

use crate::config::TEARDOWN_MAX;
use crate::core::{Flags, Frame};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::link::Link;

/// Runs the initiating side of the close.
///
/// Sends FIN until the peer answers with exactly FIN|ACK, then
/// acknowledges for as long as the peer keeps repeating FIN|ACK.
/// Returns whether the close was acknowledged before the retry
/// budget ran out. Consumes one send sequence per frame sent, and
/// reports the final sequence through `seq_send`.
pub async fn close_send<L: Link>(
    endpoint: &Endpoint<L>,
    seq_send: &mut i64,
    psize: usize,
    timeout_us: i64,
) -> Result<bool> {
    let timeout = Some(std::time::Duration::from_micros(timeout_us.max(0) as u64));
    let mut frame = Frame::vacant(psize);

    let mut budget = TEARDOWN_MAX;
    loop {
        frame.set_properties(0, *seq_send, Flags::FIN);
        *seq_send += 1;
        endpoint.send(&mut frame).await?;

        match endpoint.recv(timeout).await? {
            Some(reply) if reply.flags == Flags::FIN | Flags::ACK => break,
            _ => {
                if budget == 0 {
                    debug!("close: no FIN|ACK within the retry budget");
                    return Ok(false);
                }
                budget -= 1;
            }
        }
    }

    // FIN was acknowledged; answer with ACK while FIN|ACK keeps
    // arriving, then the peer has everything it needs.
    let mut budget = TEARDOWN_MAX;
    loop {
        frame.set_properties(0, *seq_send, Flags::ACK);
        *seq_send += 1;
        endpoint.send(&mut frame).await?;

        if budget == 0 {
            debug!("close: peer kept repeating FIN|ACK past the retry budget");
            return Ok(false);
        }
        budget -= 1;

        match endpoint.recv(timeout).await? {
            Some(reply) if reply.flags == Flags::FIN | Flags::ACK => continue,
            _ => break,
        }
    }

    Ok(true)
}

/// Runs the responding side of the close, answering a received FIN.
///
/// Repeats FIN|ACK until the initiator's bare ACK arrives or the
/// retry budget is exhausted. The FIN|ACK echoes the sequence of the
/// most recent frame heard from the peer.
pub async fn close_recv<L: Link>(
    endpoint: &Endpoint<L>,
    fin: &Frame,
    psize: usize,
    timeout_us: i64,
) -> Result<bool> {
    let timeout = Some(std::time::Duration::from_micros(timeout_us.max(0) as u64));
    let mut frame = Frame::vacant(psize);
    let mut echo_seq = fin.seq;

    let mut budget = TEARDOWN_MAX;
    loop {
        frame.set_properties(0, echo_seq, Flags::FIN | Flags::ACK);
        endpoint.send(&mut frame).await?;

        match endpoint.recv(timeout).await? {
            Some(reply) if reply.flags == Flags::ACK => return Ok(true),
            Some(reply) => echo_seq = reply.seq,
            None => {}
        }

        if budget == 0 {
            debug!("close: no final ACK within the retry budget");
            return Ok(false);
        }
        budget -= 1;
    }
}
