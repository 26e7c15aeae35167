//! Connection setup and the interactive session.

use std::net::{IpAddr, SocketAddr};

use clap::Args;
use log::{error, info};
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use utp::core::HEADER_SIZE;
use utp::{handshake, ChaosLink, Config, Endpoint, Input, Link, Opened, Protocol, UdpLink};

/// Input line that requests a graceful close.
const QUIT: &str = "QUIT";

/// Knobs shared by both roles.
#[derive(Debug, Clone, Copy, Args)]
pub struct Tuning {
    /// UDP port to listen on or connect to
    #[arg(long, default_value_t = utp::config::DEFAULT_PORT)]
    pub port: u16,

    /// Window size proposal, in frames
    #[arg(long, default_value_t = utp::config::DEFAULT_WINDOW)]
    pub wsize: i16,

    /// Payload size proposal, in bytes
    #[arg(long, default_value_t = utp::config::DEFAULT_PAYLOAD)]
    pub psize: i16,

    /// Percent chance of corrupting or dropping each outgoing
    /// datagram, to exercise the recovery paths
    #[arg(long, default_value_t = 0)]
    pub error: u8,

    /// Retransmit timeout in microseconds
    #[arg(long, default_value_t = utp::config::DEFAULT_TIMEOUT_US)]
    pub timer: i64,
}

impl Tuning {
    fn config(&self) -> Config {
        Config { wsize: self.wsize, psize: self.psize, timeout_us: self.timer }
    }
}

/// Waits for a peer, then runs the chat session.
pub async fn listen(tuning: Tuning) -> utp::Result<()> {
    let link = match UdpLink::bind(tuning.port).await {
        Ok(link) => link,
        Err(err) => {
            error!("failed to bind UDP port {}: {err}", tuning.port);
            return Err(err.into());
        }
    };

    info!("waiting for a connection on port {}", tuning.port);
    if tuning.error > 0 {
        info!("{}% chance of mangling each outgoing datagram", tuning.error.min(99));
    }

    let endpoint = Endpoint::new(ChaosLink::new(link, tuning.error));
    let opened = handshake::listen(&endpoint, &tuning.config()).await?;
    if let Some(addr) = endpoint.link().inner().remote() {
        info!("peer address: {addr}");
    }

    chat(endpoint, opened).await
}

/// Dials a listening peer, then runs the chat session.
pub async fn connect(address: IpAddr, tuning: Tuning) -> utp::Result<()> {
    let remote = SocketAddr::new(address, tuning.port);
    let link = UdpLink::connect(remote).await?;

    info!("connecting to {remote}");
    if tuning.error > 0 {
        info!("{}% chance of mangling each outgoing datagram", tuning.error.min(99));
    }

    let endpoint = Endpoint::new(ChaosLink::new(link, tuning.error));
    let opened = handshake::connect(&endpoint, &tuning.config()).await?;

    chat(endpoint, opened).await
}

/// Pumps stdin lines into the protocol and prints what the peer
/// sends, until one side closes.
async fn chat<L: Link>(endpoint: Endpoint<L>, opened: Opened) -> utp::Result<()> {
    let negotiated = opened.negotiated;
    info!(
        "connection established: window {} frames, payload {} bytes, frame {} bytes",
        negotiated.wsize,
        negotiated.psize,
        HEADER_SIZE + negotiated.psize,
    );

    let (protocol, io) = Protocol::new(endpoint, opened);
    let input = io.input;
    let mut delivered = io.delivered;

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line == QUIT {
                        let _ = input.send(Input::Quit);
                        break;
                    }
                    if !line.is_empty() {
                        let _ = input.send(Input::Message(line.into_bytes()));
                    }
                }
                // Closed stdin ends the session like a quit would.
                Ok(None) | Err(_) => {
                    let _ = input.send(Input::Quit);
                    break;
                }
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(message) = delivered.recv().await {
            println!("> {}", String::from_utf8_lossy(&message));
        }
    });

    let closed = protocol.run().await?;
    if closed.clean {
        println!("Teardown accepted. Final sequence: {}", closed.final_seq);
    } else {
        println!("Teardown finished due to timeout.");
    }
    println!("Connection terminated.");

    reader.abort();
    printer.abort();
    Ok(())
}
