//! Shared per-connection state: tracker, windows, and the buffers the
//! three protocol activities work on under one lock.
//!
//! The session owns everything mutable about an open connection. The
//! event loop dispatches inbound frames into it, the resend loop
//! scans its send window, and the request loop scans its receive
//! window; all of them hold the engine lock while they touch it.

use std::collections::VecDeque;

use log::trace;
use tokio::sync::mpsc::UnboundedSender;

use crate::clock;
use crate::config::Negotiated;
use crate::core::{Flags, Frame};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::handshake::Opened;
use crate::link::Link;
use crate::window::{in_window, Tracker, Window};

/// Connection lifecycle from the protocol's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Open,
    Closing,
    Closed,
}

/// Mutable state of one open connection.
pub(crate) struct Session {
    pub tracker: Tracker,
    pub phase: Phase,

    /// Next local sequence number to assign.
    pub seq_send: i64,

    negotiated: Negotiated,

    /// Outbound frames awaiting acknowledgement.
    send_win: Window,

    /// Acknowledgements received, parallel to `send_win`.
    acks_win: Window,

    /// Inbound frames, possibly out of order.
    recv_win: Window,

    /// Queued application messages not yet fully segmented.
    pending: VecDeque<Vec<u8>>,

    /// Byte offset into the front pending message.
    cursor: usize,

    /// Inbound payload bytes assembled up to the next END frame.
    delivery: Vec<u8>,

    /// Where completed inbound messages are handed off.
    delivered: UnboundedSender<Vec<u8>>,

    /// Scratch frame for outgoing control messages.
    scratch: Frame,
}

impl Session {
    pub fn new(opened: Opened, delivered: UnboundedSender<Vec<u8>>) -> Self {
        let Negotiated { wsize, psize, .. } = opened.negotiated;
        Self {
            tracker: Tracker::new(opened.seq_send, opened.seq_recv),
            phase: Phase::Open,
            seq_send: opened.seq_send,
            negotiated: opened.negotiated,
            send_win: Window::new(wsize, psize),
            acks_win: Window::new(wsize, psize),
            recv_win: Window::new(wsize, psize),
            pending: VecDeque::new(),
            cursor: 0,
            delivery: Vec::new(),
            delivered,
            scratch: Frame::vacant(psize),
        }
    }

    /// Queues one application message for segmentation. Empty lines
    /// carry nothing and are dropped here.
    pub fn queue_message(&mut self, message: Vec<u8>) {
        if !message.is_empty() {
            self.pending.push_back(message);
        }
    }

    /// Segments queued input into frames while the send window has
    /// room, transmitting and recording each one.
    pub async fn send_frames<L: Link>(&mut self, endpoint: &Endpoint<L>) -> Result<()> {
        let wsize = self.send_win.capacity() as i64;

        while self.tracker.outstanding() < wsize && !self.pending.is_empty() {
            let mut frame = Frame::vacant(self.negotiated.psize);
            let (consumed, finished) = {
                let front = &self.pending[0];
                let rest = &front[self.cursor..];
                let consumed = frame.set_message(rest, self.seq_send, Flags::MSG);
                (consumed, consumed == rest.len())
            };
            self.seq_send += 1;

            if finished {
                self.pending.pop_front();
                self.cursor = 0;
            } else {
                self.cursor += consumed;
            }

            endpoint.send(&mut frame).await?;
            self.send_win.insert(&frame, self.tracker.send_next)?;
            self.tracker.send_last = frame.seq;
            trace!("sent {} seq={} size={}", frame.flags, frame.seq, frame.size);
        }
        Ok(())
    }

    /// Inbound data frame: buffer it when it lands in the window,
    /// deliver whatever became contiguous, and ACK it no matter what.
    /// Duplicates and strays are re-ACKed so a sender whose ACK got
    /// lost can still slide.
    pub async fn on_message<L: Link>(
        &mut self,
        endpoint: &Endpoint<L>,
        mut frame: Frame,
    ) -> Result<()> {
        // Re-stamp with the local clock; the request loop measures
        // how long this side has been holding the frame.
        frame.time = clock::now();

        let wsize = self.recv_win.capacity();
        if in_window(frame.seq, self.tracker.recv_next, wsize) {
            self.recv_win.insert(&frame, self.tracker.recv_next)?;
            if frame.seq > self.tracker.recv_last {
                self.tracker.recv_last = frame.seq;
            }
            self.process_received();
        }

        trace!("recv {} seq={}, answering ACK", frame.flags, frame.seq);
        self.scratch.set_properties(0, frame.seq, Flags::ACK);
        endpoint.send(&mut self.scratch).await?;
        Ok(())
    }

    /// Inbound acknowledgement: record it, advance the send window as
    /// far as it is contiguously acknowledged, then refill from
    /// pending input.
    pub async fn on_ack<L: Link>(&mut self, endpoint: &Endpoint<L>, frame: &Frame) -> Result<()> {
        let wsize = self.send_win.capacity();
        if in_window(frame.seq, self.tracker.send_next, wsize) {
            trace!("recv ACK seq={}", frame.seq);
            self.acks_win.insert(frame, self.tracker.send_next)?;
            self.slide_send();
        }
        self.send_frames(endpoint).await
    }

    /// Inbound NAK: retransmit the requested frame immediately,
    /// ignoring its remaining timeout.
    pub async fn on_nak<L: Link>(&mut self, endpoint: &Endpoint<L>, frame: &Frame) -> Result<()> {
        let wsize = self.send_win.capacity();
        if in_window(frame.seq, self.tracker.send_next, wsize) {
            let idx = (frame.seq - self.tracker.send_next) as usize;
            let slot = self.send_win.slot_mut(idx);
            if slot.seq == frame.seq {
                trace!("recv {} seq={}, retransmitting", frame.flags, frame.seq);
                endpoint.send(slot).await?;
            }
        }
        Ok(())
    }

    /// Resend-loop scan: every outstanding frame whose ACK has not
    /// lined up and whose last transmission has expired goes out
    /// again, marked as a retransmission.
    pub async fn resend_expired<L: Link>(&mut self, endpoint: &Endpoint<L>) -> Result<()> {
        let wsize = self.send_win.capacity();
        let Tracker { send_next, send_last, .. } = self.tracker;
        if !in_window(send_last, send_next, wsize) {
            return Ok(());
        }

        let timeout_us = self.negotiated.timeout_us;
        let last = (send_last - send_next) as usize;
        for i in 0..=last {
            let unacked = self.acks_win.slot(i).seq != self.send_win.slot(i).seq;
            if unacked && clock::expired(self.send_win.slot(i).time, timeout_us) {
                let frame = self.send_win.slot_mut(i);
                frame.flags.insert(Flags::RES);
                trace!("timeout, resending {} seq={}", frame.flags, frame.seq);
                endpoint.send(frame).await?;
            }
        }
        Ok(())
    }

    /// Request-loop scan: once the most recently received frame has
    /// been held past the timeout, every gap below it is NAKed. The
    /// gate keeps short-lived reordering from triggering premature
    /// requests.
    pub async fn request_missing<L: Link>(&mut self, endpoint: &Endpoint<L>) -> Result<()> {
        let wsize = self.recv_win.capacity();
        let Tracker { recv_next, recv_last, .. } = self.tracker;
        if !in_window(recv_last, recv_next, wsize) {
            return Ok(());
        }

        let last = (recv_last - recv_next) as usize;
        if !clock::expired(self.recv_win.slot(last).time, self.negotiated.timeout_us) {
            return Ok(());
        }

        for i in 0..=last {
            if self.recv_win.slot(i).seq - recv_next != i as i64 {
                let seq = recv_next + i as i64;
                trace!("gap at seq={seq}, requesting");
                self.scratch.set_properties(0, seq, Flags::NAK | Flags::REQ);
                endpoint.send(&mut self.scratch).await?;
            }
        }
        Ok(())
    }

    /// Advances the send window past every contiguously acknowledged
    /// frame. Both the sent-frame and acknowledgement buffers slide
    /// together so their indexing stays parallel.
    fn slide_send(&mut self) {
        while self.acks_win.slot(0).seq == self.tracker.send_next {
            self.send_win.slide();
            self.acks_win.slide();
            self.tracker.send_next += 1;
        }
    }

    /// Drains the receive window from its base: contiguous frames are
    /// appended to the delivery buffer, and an END flag flushes the
    /// assembled message to the application.
    fn process_received(&mut self) {
        while self.recv_win.slot(0).seq == self.tracker.recv_next {
            let frame = self.recv_win.slot(0);
            self.delivery.extend_from_slice(frame.payload());

            if frame.flags.contains(Flags::END) {
                let message = std::mem::take(&mut self.delivery);
                trace!("delivering {} byte message", message.len());
                let _ = self.delivered.send(message);
            }

            self.recv_win.slide();
            self.tracker.recv_next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const WSIZE: usize = 4;
    const PSIZE: usize = 8;

    fn opened() -> Opened {
        Opened {
            negotiated: Negotiated { wsize: WSIZE, psize: PSIZE, timeout_us: 25_000 },
            seq_send: 1000,
            seq_recv: 1999,
        }
    }

    fn session() -> (Session, UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(opened(), tx), rx)
    }

    fn msg_frame(payload: &[u8], seq: i64, end: bool) -> Frame {
        let mut frame = Frame::vacant(PSIZE);
        frame.set_properties(payload.len() as i16, seq, Flags::MSG);
        frame.msg[..payload.len()].copy_from_slice(payload);
        if end {
            frame.flags.insert(Flags::END);
        }
        frame
    }

    async fn expect_frame(endpoint: &Endpoint<MemoryLink>) -> Frame {
        endpoint
            .recv(Some(Duration::from_millis(100)))
            .await
            .unwrap()
            .expect("expected a frame on the wire")
    }

    #[tokio::test]
    async fn test_in_order_message_is_delivered_and_acked() {
        let (mut session, mut delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        session.on_message(&near, msg_frame(b"hello", 2000, true)).await.unwrap();

        assert_eq!(delivered.try_recv().unwrap(), b"hello");
        let ack = expect_frame(&far).await;
        assert_eq!(ack.flags, Flags::ACK);
        assert_eq!(ack.seq, 2000);
        assert_eq!(session.tracker.recv_next, 2001);
    }

    #[tokio::test]
    async fn test_reordered_messages_buffer_then_flush() {
        let (mut session, mut delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        // seq 2001 arrives before seq 2000.
        session.on_message(&near, msg_frame(b"world", 2001, true)).await.unwrap();
        assert!(delivered.try_recv().is_err());
        assert_eq!(expect_frame(&far).await.seq, 2001);

        session.on_message(&near, msg_frame(b"hello ", 2000, false)).await.unwrap();
        assert_eq!(expect_frame(&far).await.seq, 2000);

        assert_eq!(delivered.try_recv().unwrap(), b"hello world");
        assert_eq!(session.tracker.recv_next, 2002);
    }

    #[tokio::test]
    async fn test_duplicate_and_stray_messages_are_reacked() {
        let (mut session, mut delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        session.on_message(&near, msg_frame(b"once", 2000, true)).await.unwrap();
        session.on_message(&near, msg_frame(b"once", 2000, true)).await.unwrap();

        assert_eq!(delivered.try_recv().unwrap(), b"once");
        assert!(delivered.try_recv().is_err(), "duplicate must not deliver twice");
        assert_eq!(expect_frame(&far).await.seq, 2000);
        assert_eq!(expect_frame(&far).await.seq, 2000);

        // Far outside any window: still acknowledged, never delivered.
        session.on_message(&near, msg_frame(b"stray", 5000, true)).await.unwrap();
        let ack = expect_frame(&far).await;
        assert_eq!(ack.flags, Flags::ACK);
        assert_eq!(ack.seq, 5000);
        assert!(delivered.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_frames_respects_window_and_segments() {
        let (mut session, _delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        // 3 payloads of 8 plus a 2-byte tail: 4 frames, window is 4.
        session.queue_message(b"abcdefghijklmnopqrstuvwxyz".to_vec());
        session.queue_message(b"next".to_vec());
        session.send_frames(&near).await.unwrap();

        assert_eq!(session.tracker.outstanding(), WSIZE as i64);
        let first = expect_frame(&far).await;
        assert_eq!(first.payload(), b"abcdefgh");
        assert_eq!(first.flags, Flags::MSG);
        assert_eq!(first.seq, 1000);

        for _ in 0..2 {
            expect_frame(&far).await;
        }
        let tail = expect_frame(&far).await;
        assert_eq!(tail.payload(), b"yz");
        assert_eq!(tail.flags, Flags::MSG | Flags::END);

        // Window full: "next" stays queued until an ACK slides.
        assert!(near.recv(Some(Duration::from_millis(30))).await.unwrap().is_none());

        let mut ack = Frame::vacant(PSIZE);
        ack.set_properties(0, 1000, Flags::ACK);
        session.on_ack(&near, &ack).await.unwrap();

        assert_eq!(session.tracker.send_next, 1001);
        let refill = expect_frame(&far).await;
        assert_eq!(refill.payload(), b"next");
        assert_eq!(refill.flags, Flags::MSG | Flags::END);
        assert_eq!(refill.seq, 1004);
    }

    #[tokio::test]
    async fn test_window_occupancy_stays_bounded() {
        let (mut session, _delivered) = session();
        let (near, _far) = MemoryLink::pair();
        let near = Endpoint::new(near);

        for _ in 0..10 {
            session.queue_message(vec![b'x'; PSIZE * 3]);
        }
        session.send_frames(&near).await.unwrap();

        let outstanding = session.tracker.outstanding();
        assert!((0..=WSIZE as i64).contains(&outstanding));
        assert_eq!(outstanding, WSIZE as i64);
    }

    #[tokio::test]
    async fn test_nak_triggers_immediate_resend() {
        let (mut session, _delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        session.queue_message(b"resend me".to_vec());
        session.send_frames(&near).await.unwrap();
        expect_frame(&far).await;
        expect_frame(&far).await;

        let mut nak = Frame::vacant(PSIZE);
        nak.set_properties(0, 1000, Flags::NAK | Flags::REQ);
        session.on_nak(&near, &nak).await.unwrap();

        let again = expect_frame(&far).await;
        assert_eq!(again.seq, 1000);
        assert_eq!(again.payload(), b"resend m");

        // A NAK for a sequence never sent goes nowhere.
        nak.set_properties(0, 1003, Flags::NAK | Flags::REQ);
        session.on_nak(&near, &nak).await.unwrap();
        assert!(near.recv(Some(Duration::from_millis(30))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_frames_are_resent_with_res() {
        let (mut session, _delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        session.queue_message(b"late".to_vec());
        session.send_frames(&near).await.unwrap();
        expect_frame(&far).await;

        // Nothing has expired yet.
        session.resend_expired(&near).await.unwrap();
        assert!(near.recv(Some(Duration::from_millis(5))).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.resend_expired(&near).await.unwrap();

        let again = expect_frame(&far).await;
        assert_eq!(again.seq, 1000);
        assert!(again.flags.contains(Flags::RES));
        assert_eq!(again.payload(), b"late");
    }

    #[tokio::test]
    async fn test_request_loop_naks_gaps_after_timeout() {
        let (mut session, _delivered) = session();
        let (near, far) = MemoryLink::pair();
        let (near, far) = (Endpoint::new(near), Endpoint::new(far));

        // seq 2002 arrives; 2000 and 2001 are missing.
        session.on_message(&near, msg_frame(b"third", 2002, true)).await.unwrap();
        expect_frame(&far).await;

        // Too fresh to request.
        session.request_missing(&near).await.unwrap();
        assert!(near.recv(Some(Duration::from_millis(5))).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.request_missing(&near).await.unwrap();

        let first = expect_frame(&far).await;
        assert_eq!(first.flags, Flags::NAK | Flags::REQ);
        assert_eq!(first.seq, 2000);
        let second = expect_frame(&far).await;
        assert_eq!(second.flags, Flags::NAK | Flags::REQ);
        assert_eq!(second.seq, 2001);
    }
}
