//! Selective-repeat protocol: the three cooperating activities of an
//! open connection.
//!
//! - the **event loop** reacts to inbound frames and to application
//!   input, dispatching MSG/ACK/NAK/FIN into the session;
//! - the **resend loop** periodically retransmits sent frames whose
//!   acknowledgement is overdue;
//! - the **request loop** periodically NAKs gaps in the receive
//!   window once the newest arrival has sat past the timeout.
//!
//! All three run as tokio tasks sharing the session behind one lock.
//! A connection leaves the open phase when the application submits
//! the quit request or a FIN arrives; the loops observe the shared
//! running flag and wind down, and `run` returns the close summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};

use crate::config::{Negotiated, LOOP_TICK};
use crate::core::FrameKind;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::handshake::Opened;
use crate::link::Link;
use crate::session::{Phase, Session};
use crate::teardown;

/// Application input to an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// One application message, delivered to the peer in order.
    Message(Vec<u8>),

    /// Graceful close request.
    Quit,
}

/// The application-facing ends of a connection: messages in, messages
/// out.
#[derive(Debug)]
pub struct ProtocolIo {
    /// Feed of outbound messages and the quit request.
    pub input: UnboundedSender<Input>,

    /// Completed inbound messages, in order, one per END frame.
    pub delivered: UnboundedReceiver<Vec<u8>>,
}

/// Summary of a finished connection.
#[derive(Debug, Clone, Copy)]
pub struct Closed {
    /// Whether the teardown exchange was acknowledged in time.
    pub clean: bool,

    /// Final send sequence after the closing frames.
    pub final_seq: i64,
}

struct Shared {
    state: Mutex<Session>,
    running: AtomicBool,
    shutdown: Notify,
}

impl Shared {
    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// One open connection's protocol engine.
pub struct Protocol<L> {
    endpoint: Arc<Endpoint<L>>,
    shared: Arc<Shared>,
    negotiated: Negotiated,
    input: UnboundedReceiver<Input>,
}

impl<L: Link> Protocol<L> {
    /// Builds the engine for a connection that completed its
    /// handshake, returning the application-facing channels with it.
    pub fn new(endpoint: Endpoint<L>, opened: Opened) -> (Self, ProtocolIo) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(Session::new(opened, delivered_tx)),
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
        });

        let protocol = Self {
            endpoint: Arc::new(endpoint),
            shared,
            negotiated: opened.negotiated,
            input: input_rx,
        };
        let io = ProtocolIo { input: input_tx, delivered: delivered_rx };
        (protocol, io)
    }

    /// Runs the connection until it closes, then reports how the
    /// teardown went.
    pub async fn run(self) -> Result<Closed> {
        let Self { endpoint, shared, negotiated, input } = self;

        let resend = tokio::spawn(resend_loop(shared.clone(), endpoint.clone()));
        let request = tokio::spawn(request_loop(shared.clone(), endpoint.clone()));
        let events = tokio::spawn(event_loop(shared.clone(), endpoint, negotiated, input));

        let clean = join(events).await?;
        join(resend).await?;
        join(request).await?;

        let final_seq = shared.state.lock().await.seq_send;
        debug!("connection wound down, clean={clean}, final sequence {final_seq}");
        Ok(Closed { clean, final_seq })
    }
}

async fn join<T>(handle: tokio::task::JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))?
}

/// Reacts to one event at a time: a verified inbound frame or a line
/// of application input. Holds the engine lock only while processing.
async fn event_loop<L: Link>(
    shared: Arc<Shared>,
    endpoint: Arc<Endpoint<L>>,
    negotiated: Negotiated,
    input: UnboundedReceiver<Input>,
) -> Result<bool> {
    let result = handle_events(&shared, endpoint.as_ref(), negotiated, input).await;
    if let Err(err) = &result {
        error!("event loop failed: {err}");
        shared.stop();
    }
    result
}

async fn handle_events<L: Link>(
    shared: &Shared,
    endpoint: &Endpoint<L>,
    negotiated: Negotiated,
    mut input: UnboundedReceiver<Input>,
) -> Result<bool> {
    let mut clean = false;

    while shared.is_running() {
        tokio::select! {
            received = endpoint.recv(None) => {
                // Corrupted arrivals surface as None: same as silence.
                let Some(frame) = received? else { continue };
                let mut session = shared.state.lock().await;

                match frame.kind() {
                    Some(FrameKind::Msg) => session.on_message(endpoint, frame).await?,
                    Some(FrameKind::Ack) => session.on_ack(endpoint, &frame).await?,
                    Some(FrameKind::Nak) => session.on_nak(endpoint, &frame).await?,
                    Some(FrameKind::Fin) => {
                        shared.stop();
                        session.phase = Phase::Closing;
                        clean = teardown::close_recv(
                            endpoint,
                            &frame,
                            negotiated.psize,
                            negotiated.timeout_us,
                        )
                        .await?;
                        session.phase = Phase::Closed;
                    }
                    // Handshake stragglers and unknown types.
                    _ => debug!("ignoring {} seq={}", frame.flags, frame.seq),
                }
            }

            submitted = input.recv() => {
                let mut session = shared.state.lock().await;
                match submitted {
                    Some(Input::Message(message)) => {
                        session.queue_message(message);
                        session.send_frames(endpoint).await?;
                    }
                    Some(Input::Quit) | None => {
                        shared.stop();
                        session.phase = Phase::Closing;
                        let mut seq_send = session.seq_send;
                        clean = teardown::close_send(
                            endpoint,
                            &mut seq_send,
                            negotiated.psize,
                            negotiated.timeout_us,
                        )
                        .await?;
                        session.seq_send = seq_send;
                        session.phase = Phase::Closed;
                    }
                }
            }

            _ = shared.shutdown.notified() => {}
        }
    }

    Ok(clean)
}

/// Periodically retransmits un-ACKed sent frames past their timeout.
async fn resend_loop<L: Link>(shared: Arc<Shared>, endpoint: Arc<Endpoint<L>>) -> Result<()> {
    while shared.is_running() {
        {
            let mut session = shared.state.lock().await;
            if let Err(err) = session.resend_expired(endpoint.as_ref()).await {
                error!("resend loop failed: {err}");
                shared.stop();
                return Err(err);
            }
        }
        tokio::time::sleep(LOOP_TICK).await;
    }
    Ok(())
}

/// Periodically requests missing frames for gaps in the receive
/// window.
async fn request_loop<L: Link>(shared: Arc<Shared>, endpoint: Arc<Endpoint<L>>) -> Result<()> {
    while shared.is_running() {
        {
            let mut session = shared.state.lock().await;
            if let Err(err) = session.request_missing(endpoint.as_ref()).await {
                error!("request loop failed: {err}");
                shared.stop();
                return Err(err);
            }
        }
        tokio::time::sleep(LOOP_TICK).await;
    }
    Ok(())
}
