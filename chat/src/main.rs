//! Line-oriented peer-to-peer chat over the utp transport.
//!
//! One binary plays either role: `listen` waits for a peer on a UDP
//! port, `connect` dials one. After the handshake both sides are
//! symmetric: every stdin line travels as one reliable message, and
//! delivered messages print as `> text`. The literal line `QUIT`
//! closes the connection gracefully.

mod peer;

use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use log::error;

use peer::Tuning;

#[derive(Parser)]
#[command(name = "chat", about = "Peer-to-peer messaging over reliable UDP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer to connect
    #[command(alias = "server")]
    Listen {
        #[command(flatten)]
        tuning: Tuning,
    },

    /// Connect to a listening peer
    #[command(alias = "client")]
    Connect {
        /// IP address of the listening peer
        address: std::net::IpAddr,

        #[command(flatten)]
        tuning: Tuning,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        return ExitCode::SUCCESS;
    };

    let result = match command {
        Command::Listen { tuning } => peer::listen(tuning).await,
        Command::Connect { address, tuning } => peer::connect(address, tuning).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
